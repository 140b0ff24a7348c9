//! Ingestion boundary: payload normalization and partition queues.

pub mod normalizer;
pub mod queue;

pub use normalizer::{
    fear_greed_to_sentiment, normalize_order_book_imbalance, normalize_put_call_ratio,
    normalize_score, RawObservation,
};
pub use queue::{CoalescingQueue, PushOutcome};
