//! Alert output schema.

use crate::models::observation::SourceName;
use crate::models::signal::SignalName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    SentimentSpike,
    SentimentDivergence,
    VolatilityRegimeChange,
    SocialVolumeAnomaly,
    FearGreedExtreme,
}

impl AlertType {
    /// Evaluation order when several rules fire in the same update.
    pub const PRIORITY: [AlertType; 5] = [
        AlertType::VolatilityRegimeChange,
        AlertType::FearGreedExtreme,
        AlertType::SentimentSpike,
        AlertType::SentimentDivergence,
        AlertType::SocialVolumeAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SentimentSpike => "SENTIMENT_SPIKE",
            AlertType::SentimentDivergence => "SENTIMENT_DIVERGENCE",
            AlertType::VolatilityRegimeChange => "VOLATILITY_REGIME_CHANGE",
            AlertType::SocialVolumeAnomaly => "SOCIAL_VOLUME_ANOMALY",
            AlertType::FearGreedExtreme => "FEAR_GREED_EXTREME",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub contributing_sources: Vec<SourceName>,
    pub confidence: f64,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub entity: String,
    pub signal_name: SignalName,
    pub current_value: f64,
    pub threshold: f64,
    pub description: String,
    pub metadata: AlertMetadata,
}
