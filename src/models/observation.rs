//! Canonical source observation produced by the normalization boundary.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of upstream sentiment sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    News,
    Social,
    OrderBook,
    Options,
    FearGreed,
    Volatility,
    SocialVolume,
}

impl SourceName {
    pub const ALL: [SourceName; 7] = [
        SourceName::News,
        SourceName::Social,
        SourceName::OrderBook,
        SourceName::Options,
        SourceName::FearGreed,
        SourceName::Volatility,
        SourceName::SocialVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::News => "news",
            SourceName::Social => "social",
            SourceName::OrderBook => "order_book",
            SourceName::Options => "options",
            SourceName::FearGreed => "fear_greed",
            SourceName::Volatility => "volatility",
            SourceName::SocialVolume => "social_volume",
        }
    }

    /// Declared value range `(min, max)` for this source.
    ///
    /// Sentiment-style sources are normalized to [-1, 1]; index and volume
    /// sources keep their native scale.
    pub fn range(&self) -> (f64, f64) {
        match self {
            SourceName::News | SourceName::Social | SourceName::OrderBook | SourceName::Options => {
                (-1.0, 1.0)
            }
            SourceName::FearGreed => (0.0, 100.0),
            SourceName::Volatility | SourceName::SocialVolume => (0.0, f64::MAX),
        }
    }

    /// Expected update interval used for staleness when not configured.
    pub fn default_interval_secs(&self) -> u64 {
        match self {
            SourceName::News => 900,
            SourceName::Social => 300,
            SourceName::OrderBook => 60,
            SourceName::Options => 900,
            SourceName::FearGreed => 90_000,
            SourceName::Volatility => 900,
            SourceName::SocialVolume => 300,
        }
    }

    pub fn check_value(&self, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field: "value" });
        }
        let (min, max) = self.range();
        if value < min || value > max {
            return Err(ValidationError::OutOfRange {
                source_name: *self,
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceName::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownSource(s.to_string()))
    }
}

/// One validated observation for one entity from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceObservation {
    pub entity: String,
    pub source: SourceName,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_confidence() -> f64 {
    1.0
}

impl SourceObservation {
    pub fn new(
        entity: impl Into<String>,
        source: SourceName,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let observation = Self {
            entity: entity.into(),
            source,
            value,
            timestamp,
            confidence: default_confidence(),
            metadata: None,
        };
        observation.validate()?;
        Ok(observation)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self, ValidationError> {
        check_confidence(confidence)?;
        self.confidence = confidence;
        Ok(self)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check every field against the source contract.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entity.trim().is_empty() {
            return Err(ValidationError::EmptyEntity);
        }
        self.source.check_value(self.value)?;
        check_confidence(self.confidence)
    }

    /// Same source, same instant, same value: an at-least-once redelivery.
    pub fn is_redelivery_of(&self, other: &SourceObservation) -> bool {
        self.source == other.source && self.timestamp == other.timestamp && self.value == other.value
    }
}

fn check_confidence(confidence: f64) -> Result<(), ValidationError> {
    if !confidence.is_finite() {
        return Err(ValidationError::NonFinite { field: "confidence" });
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::InvalidConfidence(confidence));
    }
    Ok(())
}
