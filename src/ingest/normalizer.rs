//! Provider payload normalization into `SourceObservation`.

use crate::error::ValidationError;
use crate::models::observation::{SourceName, SourceObservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Loosely typed observation as it arrives from a provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub entity: String,
    pub source: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl RawObservation {
    /// Validate and convert. Surrounding whitespace is trimmed from the entity.
    pub fn into_observation(self) -> Result<SourceObservation, ValidationError> {
        let source: SourceName = self.source.parse()?;
        let entity = self.entity.trim().to_string();

        let mut observation = SourceObservation::new(entity, source, self.value, self.timestamp)?;
        if let Some(confidence) = self.confidence {
            observation = observation.with_confidence(confidence)?;
        }
        if let Some(metadata) = self.metadata {
            observation = observation.with_metadata(metadata);
        }
        Ok(observation)
    }
}

impl TryFrom<RawObservation> for SourceObservation {
    type Error = ValidationError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        raw.into_observation()
    }
}

/// Rescale `value` from `[min, max]` to `[-1, 1]`, clamped.
pub fn normalize_score(value: f64, min: f64, max: f64) -> f64 {
    if max == min || !value.is_finite() {
        return 0.0;
    }
    let normalized = 2.0 * ((value - min) / (max - min)) - 1.0;
    normalized.clamp(-1.0, 1.0)
}

/// Book imbalance `(bid - ask) / (bid + ask)`; 0 for an empty book.
pub fn normalize_order_book_imbalance(bid_volume: f64, ask_volume: f64) -> f64 {
    let total = bid_volume + ask_volume;
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    ((bid_volume - ask_volume) / total).clamp(-1.0, 1.0)
}

/// Put/call ratio to sentiment: 1.0 is neutral, heavy put buying is bearish.
pub fn normalize_put_call_ratio(ratio: f64) -> f64 {
    if ratio < 0.0 || !ratio.is_finite() {
        return 0.0;
    }
    ((1.0 - ratio) / (1.0 + ratio)).clamp(-1.0, 1.0)
}

/// Fear & greed index (0-100) on the sentiment scale.
pub fn fear_greed_to_sentiment(index: f64) -> f64 {
    normalize_score(index, 0.0, 100.0)
}
