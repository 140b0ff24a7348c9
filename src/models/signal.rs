//! Smoothed signal state, snapshots and detector events.

use crate::models::observation::SourceName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    CompositeSentiment,
    FearGreedIndex,
    VolatilityIndex,
    SocialVolume,
}

impl SignalName {
    pub const ALL: [SignalName; 4] = [
        SignalName::CompositeSentiment,
        SignalName::FearGreedIndex,
        SignalName::VolatilityIndex,
        SignalName::SocialVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::CompositeSentiment => "composite_sentiment",
            SignalName::FearGreedIndex => "fear_greed_index",
            SignalName::VolatilityIndex => "volatility_index",
            SignalName::SocialVolume => "social_volume",
        }
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalName::ALL
            .into_iter()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| format!("unknown signal: {}", s))
    }
}

/// Named smoothing time-scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Fast,
    Medium,
    Slow,
    Daily,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Fast, Window::Medium, Window::Slow, Window::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Fast => "fast",
            Window::Medium => "medium",
            Window::Slow => "slow",
            Window::Daily => "daily",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|window| window.as_str() == s)
            .ok_or_else(|| format!("unknown window: {}", s))
    }
}

/// Current smoothed value of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowValue {
    pub value: f64,
    pub updated_at: DateTime<Utc>,
    /// Value before the most recent update, `None` after the first sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
    pub samples: u64,
}

/// Per entity x signal smoothing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub entity: String,
    pub signal: SignalName,
    pub raw: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_raw: Option<f64>,
    pub updated_at: DateTime<Utc>,
    /// Number of applied updates.
    pub updates: u64,
    pub windows: BTreeMap<Window, WindowValue>,
}

impl SignalState {
    pub fn window(&self, window: Window) -> Option<&WindowValue> {
        self.windows.get(&window)
    }

    pub fn value(&self, window: Window) -> Option<f64> {
        self.windows.get(&window).map(|w| w.value)
    }

    pub fn previous(&self, window: Window) -> Option<f64> {
        self.windows.get(&window).and_then(|w| w.previous)
    }
}

/// Copy of a signal's state handed to readers and sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub state: SignalState,
    pub contributing_sources: Vec<SourceName>,
    pub confidence: f64,
}

/// All tracked signals of one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: String,
    pub updated_at: DateTime<Utc>,
    pub signals: BTreeMap<SignalName, SignalSnapshot>,
}

impl EntitySnapshot {
    pub fn lookup(&self, signal: SignalName, window: Window) -> SnapshotLookup {
        self.signals
            .get(&signal)
            .and_then(|snapshot| snapshot.state.window(window))
            .map(|w| SnapshotLookup::Value {
                value: w.value,
                updated_at: w.updated_at,
            })
            .unwrap_or(SnapshotLookup::NoData)
    }
}

/// Result of the signal snapshot query contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotLookup {
    Value {
        value: f64,
        updated_at: DateTime<Utc>,
    },
    NoData,
}

/// Ordered volatility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
    Extreme,
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VolatilityRegime::Low => "LOW",
            VolatilityRegime::Normal => "NORMAL",
            VolatilityRegime::High => "HIGH",
            VolatilityRegime::Extreme => "EXTREME",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    Bullish,
    Bearish,
}

/// Pair of windows compared for crossovers, leading window first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverPair {
    FastMedium,
    MediumSlow,
    MediumDaily,
}

impl CrossoverPair {
    pub const ALL: [CrossoverPair; 3] = [
        CrossoverPair::FastMedium,
        CrossoverPair::MediumSlow,
        CrossoverPair::MediumDaily,
    ];

    pub fn windows(&self) -> (Window, Window) {
        match self {
            CrossoverPair::FastMedium => (Window::Fast, Window::Medium),
            CrossoverPair::MediumSlow => (Window::Medium, Window::Slow),
            CrossoverPair::MediumDaily => (Window::Medium, Window::Daily),
        }
    }

    /// Medium against a long baseline marks a trend regime change.
    pub fn is_trend_shift(&self) -> bool {
        !matches!(self, CrossoverPair::FastMedium)
    }
}

/// Discrete event found by the crossover and regime detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalEvent {
    Crossover {
        pair: CrossoverPair,
        direction: CrossDirection,
        leading: f64,
        baseline: f64,
    },
    RegimeChange {
        window: Window,
        from: VolatilityRegime,
        to: VolatilityRegime,
        value: f64,
    },
}

/// Detector event tagged with where and when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEventRecord {
    pub entity: String,
    pub signal: SignalName,
    pub timestamp: DateTime<Utc>,
    pub event: SignalEvent,
}
