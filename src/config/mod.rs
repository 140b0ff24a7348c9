//! Engine configuration.
//!
//! An `EngineConfig` is built once (defaults, optional JSON file, environment
//! overrides), validated, and then treated as immutable. Reconfiguration
//! replaces the whole value; nothing mutates a live configuration in place.

use crate::error::ConfigError;
use crate::models::alert::{AlertType, Severity};
use crate::models::observation::SourceName;
use crate::models::signal::{SignalName, Window};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Deployment environment (`production`, `sandbox`, ...).
pub fn get_environment() -> String {
    env::var("APP_ENV")
        .or_else(|_| env::var("ENVIRONMENT"))
        .unwrap_or_else(|_| "sandbox".to_string())
}

pub fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Upper bound for every `*_secs` setting (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub expected_interval_secs: u64,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceSettings {
    pub fn for_source(source: SourceName) -> Self {
        Self {
            enabled: true,
            expected_interval_secs: source.default_interval_secs(),
        }
    }

    pub fn expected_interval(&self) -> Duration {
        Duration::seconds(self.expected_interval_secs as i64)
    }
}

/// Source weights for one composite signal.
///
/// Weights need not sum to 1; they are renormalized over the sources that
/// are fresh at fusion time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeWeightConfig {
    weights: BTreeMap<SourceName, f64>,
}

impl CompositeWeightConfig {
    pub fn new(weights: impl IntoIterator<Item = (SourceName, f64)>) -> Self {
        Self {
            weights: weights.into_iter().collect(),
        }
    }

    pub fn weight(&self, source: SourceName) -> Option<f64> {
        self.weights.get(&source).copied()
    }

    pub fn contains(&self, source: SourceName) -> bool {
        self.weights.contains_key(&source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceName, f64)> + '_ {
        self.weights.iter().map(|(source, weight)| (*source, *weight))
    }

    pub fn validate(&self, signal: SignalName) -> Result<(), ConfigError> {
        if self.weights.is_empty() {
            return Err(ConfigError::Invalid(format!("signal {} has no sources", signal)));
        }
        for (source, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight {} for {}/{} must be a non-negative number",
                    weight, signal, source
                )));
            }
        }
        if self.weights.values().sum::<f64>() <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "signal {} needs at least one positive weight",
                signal
            )));
        }
        Ok(())
    }
}

/// Smoothing window periods. EMA periods are in update ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub fast: u32,
    pub medium: u32,
    pub slow: u32,
    pub daily_span_secs: u64,
    pub daily_max_samples: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            fast: 5,
            medium: 20,
            slow: 60,
            daily_span_secs: 86_400,
            daily_max_samples: 10_000,
        }
    }
}

impl WindowSettings {
    /// EMA period of a window; `None` for the rolling daily window.
    pub fn period(&self, window: Window) -> Option<u32> {
        match window {
            Window::Fast => Some(self.fast),
            Window::Medium => Some(self.medium),
            Window::Slow => Some(self.slow),
            Window::Daily => None,
        }
    }

    pub fn daily_span(&self) -> Duration {
        Duration::seconds(self.daily_span_secs as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeSettings {
    /// Lower edges of NORMAL, HIGH and EXTREME.
    pub breakpoints: [f64; 3],
    pub signal: SignalName,
    pub window: Window,
}

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            breakpoints: [15.0, 25.0, 35.0],
            signal: SignalName::VolatilityIndex,
            window: Window::Fast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Applied updates a signal needs before crossovers are reported. The
    /// first update seeds every window with the same value.
    pub warmup_updates: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self { warmup_updates: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleSettings {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub severity: Severity,
    pub cooldown_secs: u64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<f64>,
}

impl AlertRuleSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn defaults_for(alert_type: AlertType) -> Self {
        let (severity, cooldown_secs, threshold, upper_threshold) = match alert_type {
            AlertType::SentimentSpike => (Severity::Warning, 900, 0.75, None),
            AlertType::FearGreedExtreme => (Severity::Warning, 3_600, 20.0, Some(80.0)),
            AlertType::VolatilityRegimeChange => (Severity::Warning, 1_800, 0.0, None),
            AlertType::SocialVolumeAnomaly => (Severity::Warning, 1_800, 3.0, None),
            AlertType::SentimentDivergence => (Severity::Info, 1_800, 0.0, None),
        };
        Self {
            enabled: true,
            severity,
            cooldown_secs,
            threshold,
            upper_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub partitions: usize,
    pub queue_capacity: usize,
    pub eviction_horizon_secs: u64,
    /// Seconds between idle-entity sweeps; 0 disables the sweep.
    pub eviction_interval_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_capacity: 1_024,
            eviction_horizon_secs: 172_800,
            eviction_interval_secs: 3_600,
        }
    }
}

impl RuntimeSettings {
    pub fn eviction_horizon(&self) -> Duration {
        Duration::seconds(self.eviction_horizon_secs as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub lane_capacity: usize,
    pub max_retries: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_ms: u64,
    pub publish_snapshots: bool,
    pub publish_events: bool,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            lane_capacity: 4_096,
            max_retries: 3,
            min_backoff_ms: 100,
            max_backoff_ms: 2_000,
            attempt_timeout_ms: 2_000,
            publish_snapshots: true,
            publish_events: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sources: BTreeMap<SourceName, SourceSettings>,
    pub signals: BTreeMap<SignalName, CompositeWeightConfig>,
    pub windows: WindowSettings,
    pub regime: RegimeSettings,
    pub detector: DetectorSettings,
    pub alerts: BTreeMap<AlertType, AlertRuleSettings>,
    pub runtime: RuntimeSettings,
    pub publisher: PublisherSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sources = SourceName::ALL
            .into_iter()
            .map(|source| (source, SourceSettings::for_source(source)))
            .collect();

        let mut signals = BTreeMap::new();
        signals.insert(
            SignalName::CompositeSentiment,
            CompositeWeightConfig::new([
                (SourceName::News, 0.30),
                (SourceName::Social, 0.25),
                (SourceName::OrderBook, 0.25),
                (SourceName::Options, 0.20),
            ]),
        );
        signals.insert(
            SignalName::FearGreedIndex,
            CompositeWeightConfig::new([(SourceName::FearGreed, 1.0)]),
        );
        signals.insert(
            SignalName::VolatilityIndex,
            CompositeWeightConfig::new([(SourceName::Volatility, 1.0)]),
        );
        signals.insert(
            SignalName::SocialVolume,
            CompositeWeightConfig::new([(SourceName::SocialVolume, 1.0)]),
        );

        let alerts = AlertType::PRIORITY
            .into_iter()
            .map(|alert_type| (alert_type, AlertRuleSettings::defaults_for(alert_type)))
            .collect();

        Self {
            sources,
            signals,
            windows: WindowSettings::default(),
            regime: RegimeSettings::default(),
            detector: DetectorSettings::default(),
            alerts,
            runtime: RuntimeSettings::default(),
            publisher: PublisherSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Settings for a source, falling back to its built-in interval.
    pub fn source(&self, source: SourceName) -> SourceSettings {
        self.sources
            .get(&source)
            .cloned()
            .unwrap_or_else(|| SourceSettings::for_source(source))
    }

    pub fn is_source_enabled(&self, source: SourceName) -> bool {
        self.source(source).enabled
    }

    pub fn weights(&self, signal: SignalName) -> Option<&CompositeWeightConfig> {
        self.signals.get(&signal)
    }

    /// Signals whose composite includes `source`, in signal order.
    pub fn signals_for(
        &self,
        source: SourceName,
    ) -> impl Iterator<Item = (SignalName, &CompositeWeightConfig)> + '_ {
        self.signals
            .iter()
            .filter(move |(_, weights)| weights.contains(source))
            .map(|(signal, weights)| (*signal, weights))
    }

    pub fn alert(&self, alert_type: AlertType) -> Option<&AlertRuleSettings> {
        self.alerts.get(&alert_type)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (signal, weights) in &self.signals {
            weights.validate(*signal)?;
        }

        for (source, settings) in &self.sources {
            check_duration(
                &format!("{} expected_interval_secs", source),
                settings.expected_interval_secs,
            )?;
        }
        for (alert_type, rule) in &self.alerts {
            check_duration(&format!("{} cooldown_secs", alert_type), rule.cooldown_secs)?;
        }
        check_duration("daily_span_secs", self.windows.daily_span_secs)?;
        check_duration("eviction_horizon_secs", self.runtime.eviction_horizon_secs)?;
        check_duration("eviction_interval_secs", self.runtime.eviction_interval_secs)?;

        let w = &self.windows;
        if w.fast == 0 || w.medium == 0 || w.slow == 0 {
            return Err(ConfigError::Invalid("EMA periods must be at least 1".to_string()));
        }
        if w.daily_span_secs == 0 || w.daily_max_samples == 0 {
            return Err(ConfigError::Invalid(
                "daily window needs a positive span and sample bound".to_string(),
            ));
        }

        let [normal, high, extreme] = self.regime.breakpoints;
        if !(normal < high && high < extreme) || !extreme.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "regime breakpoints must be finite and strictly increasing: {:?}",
                self.regime.breakpoints
            )));
        }

        for (alert_type, rule) in &self.alerts {
            if !rule.threshold.is_finite() {
                return Err(ConfigError::Invalid(format!("{} threshold is not finite", alert_type)));
            }
            if *alert_type == AlertType::FearGreedExtreme {
                match rule.upper_threshold {
                    Some(upper) if upper > rule.threshold => {}
                    _ => {
                        return Err(ConfigError::Invalid(
                            "FEAR_GREED_EXTREME needs upper_threshold above threshold".to_string(),
                        ))
                    }
                }
            }
        }

        if self.runtime.partitions == 0 || self.runtime.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "runtime partitions and queue capacity must be positive".to_string(),
            ));
        }
        if self.publisher.lane_capacity == 0 {
            return Err(ConfigError::Invalid("publisher lane capacity must be positive".to_string()));
        }

        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or `SENTRIX_CONFIG` file, then environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("SENTRIX_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Some(partitions) = env_parse::<usize>("SENTRIX_PARTITIONS") {
            config.runtime.partitions = partitions;
        }
        if let Some(capacity) = env_parse::<usize>("SENTRIX_QUEUE_CAPACITY") {
            config.runtime.queue_capacity = capacity;
        }
        if let Some(interval) = env_parse::<u64>("EVICTION_INTERVAL_SECONDS") {
            config.runtime.eviction_interval_secs = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

fn check_duration(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid(format!(
            "{} = {} exceeds the {} second limit",
            name, secs, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
