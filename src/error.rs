//! Error types for the ingestion boundary, fusion, configuration and sinks.

use crate::models::observation::SourceName;
use thiserror::Error;

/// Malformed or out-of-range observation, rejected before it reaches fusion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("entity identifier is empty")]
    EmptyEntity,

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("value {value} for source {source_name} is outside [{min}, {max}]")]
    OutOfRange {
        source_name: SourceName,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("invalid fusion input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("observation for entity {found} passed to fusion of {expected}")]
    EntityMismatch { expected: String, found: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("source {0} is disabled")]
    SourceDisabled(SourceName),

    #[error("runtime is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("publish attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("sink is closed")]
    Closed,
}
