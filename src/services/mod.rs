//! Outbound delivery: publisher lanes and sinks

pub mod publisher;
pub mod sinks;

pub use publisher::{deliver, EventSink, PublishEvent, Publisher};
pub use sinks::{ChannelSink, LogSink, RedisSink, WebhookSink};
