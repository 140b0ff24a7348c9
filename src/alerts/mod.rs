//! Alert rules and the cooldown-aware alert engine.

pub mod engine;
pub mod rules;

pub use engine::{AlertEngine, AlertHistory, Evaluation, HistoryEntry, SignalInputs};
pub use rules::{AlertRule, RuleCondition, Trigger};
