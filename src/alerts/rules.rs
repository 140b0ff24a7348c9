//! Static alert rules: a condition paired with a severity and a cooldown.

use crate::config::EngineConfig;
use crate::indicators::volatility::boundary_between;
use crate::models::alert::{AlertType, Severity};
use crate::models::signal::{CrossDirection, SignalEvent, SignalName, SignalState, VolatilityRegime, Window};
use chrono::Duration;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    /// `abs(raw) >= threshold`.
    AbsoluteAtLeast { signal: SignalName, threshold: f64 },
    /// `raw <= low` or `raw >= high`.
    OutsideBand {
        signal: SignalName,
        low: f64,
        high: f64,
    },
    /// `raw / baseline window >= threshold`, once the baseline has `min_samples`.
    RatioToBaseline {
        signal: SignalName,
        baseline: Window,
        threshold: f64,
        min_samples: u64,
    },
    /// Medium crossed a long baseline and sits at least `min_separation` away.
    TrendCrossover {
        signal: SignalName,
        min_separation: f64,
    },
    /// Volatility bucket changed.
    RegimeShift {
        signal: SignalName,
        breakpoints: [f64; 3],
    },
}

impl RuleCondition {
    pub fn signal(&self) -> SignalName {
        match self {
            RuleCondition::AbsoluteAtLeast { signal, .. }
            | RuleCondition::OutsideBand { signal, .. }
            | RuleCondition::RatioToBaseline { signal, .. }
            | RuleCondition::TrendCrossover { signal, .. }
            | RuleCondition::RegimeShift { signal, .. } => *signal,
        }
    }
}

/// What a satisfied condition reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub value: f64,
    pub threshold: f64,
    pub description: String,
    pub recommendation: String,
    pub details: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub cooldown: Duration,
    pub condition: RuleCondition,
}

impl AlertRule {
    /// Enabled rules from `config`, in evaluation priority order.
    pub fn from_config(config: &EngineConfig) -> Vec<AlertRule> {
        AlertType::PRIORITY
            .into_iter()
            .filter_map(|alert_type| {
                let settings = config.alert(alert_type)?;
                if !settings.enabled {
                    return None;
                }
                let condition = match alert_type {
                    AlertType::SentimentSpike => RuleCondition::AbsoluteAtLeast {
                        signal: SignalName::CompositeSentiment,
                        threshold: settings.threshold,
                    },
                    AlertType::FearGreedExtreme => RuleCondition::OutsideBand {
                        signal: SignalName::FearGreedIndex,
                        low: settings.threshold,
                        high: settings.upper_threshold.unwrap_or(100.0 - settings.threshold),
                    },
                    AlertType::SocialVolumeAnomaly => RuleCondition::RatioToBaseline {
                        signal: SignalName::SocialVolume,
                        baseline: Window::Daily,
                        threshold: settings.threshold,
                        min_samples: 2,
                    },
                    AlertType::SentimentDivergence => RuleCondition::TrendCrossover {
                        signal: SignalName::CompositeSentiment,
                        min_separation: settings.threshold,
                    },
                    AlertType::VolatilityRegimeChange => RuleCondition::RegimeShift {
                        signal: config.regime.signal,
                        breakpoints: config.regime.breakpoints,
                    },
                };
                Some(AlertRule {
                    alert_type,
                    severity: settings.severity,
                    cooldown: settings.cooldown(),
                    condition,
                })
            })
            .collect()
    }

    pub fn signal(&self) -> SignalName {
        self.condition.signal()
    }

    /// Evaluate the condition against the signal's state and this update's events.
    pub fn check(&self, state: &SignalState, events: &[SignalEvent]) -> Option<Trigger> {
        match &self.condition {
            RuleCondition::AbsoluteAtLeast { threshold, .. } => {
                let value = state.raw;
                (value.abs() >= *threshold).then(|| {
                    let (mood, recommendation) = if value >= 0.0 {
                        (
                            "bullish",
                            "Bullish sentiment spike; confirm with price action before adding exposure",
                        )
                    } else {
                        (
                            "bearish",
                            "Bearish sentiment spike; review downside protection on open positions",
                        )
                    };
                    Trigger {
                        value,
                        threshold: *threshold,
                        description: format!(
                            "Composite sentiment {:.2} is a {} spike beyond {:.2}",
                            value, mood, threshold
                        ),
                        recommendation: recommendation.to_string(),
                        details: BTreeMap::from([("direction".to_string(), json!(mood))]),
                    }
                })
            }
            RuleCondition::OutsideBand { low, high, .. } => {
                let value = state.raw;
                if value <= *low {
                    Some(Trigger {
                        value,
                        threshold: *low,
                        description: format!("Fear & greed index {:.0} at extreme fear (<= {:.0})", value, low),
                        recommendation: "Extreme fear; historically a contrarian accumulation zone".to_string(),
                        details: BTreeMap::from([("branch".to_string(), json!("extreme_fear"))]),
                    })
                } else if value >= *high {
                    Some(Trigger {
                        value,
                        threshold: *high,
                        description: format!("Fear & greed index {:.0} at extreme greed (>= {:.0})", value, high),
                        recommendation: "Extreme greed; consider tightening stops and trimming risk".to_string(),
                        details: BTreeMap::from([("branch".to_string(), json!("extreme_greed"))]),
                    })
                } else {
                    None
                }
            }
            RuleCondition::RatioToBaseline {
                baseline,
                threshold,
                min_samples,
                ..
            } => {
                let base = state.window(*baseline)?;
                if base.samples < *min_samples || base.value <= 0.0 {
                    return None;
                }
                let ratio = state.raw / base.value;
                (ratio >= *threshold).then(|| Trigger {
                    value: state.raw,
                    threshold: base.value * threshold,
                    description: format!(
                        "Social volume {:.0} is {:.1}x its {} average",
                        state.raw, ratio, baseline
                    ),
                    recommendation: "Unusual social activity; watch for momentum bursts or pump-and-dump behavior"
                        .to_string(),
                    details: BTreeMap::from([
                        ("ratio".to_string(), json!(ratio)),
                        ("baseline".to_string(), json!(base.value)),
                    ]),
                })
            }
            RuleCondition::TrendCrossover { min_separation, .. } => {
                events.iter().find_map(|event| match event {
                    SignalEvent::Crossover {
                        pair,
                        direction,
                        leading,
                        baseline,
                    } if pair.is_trend_shift() && (leading - baseline).abs() >= *min_separation => {
                        let (baseline_window, word) = (pair.windows().1, match direction {
                            CrossDirection::Bullish => "above",
                            CrossDirection::Bearish => "below",
                        });
                        Some(Trigger {
                            value: *leading,
                            threshold: *baseline,
                            description: format!(
                                "Medium-term sentiment {:.2} crossed {} its {} baseline {:.2}",
                                leading, word, baseline_window, baseline
                            ),
                            recommendation: "Short-term sentiment diverging from trend; watch for a reversal"
                                .to_string(),
                            details: BTreeMap::from([
                                ("pair".to_string(), json!(pair)),
                                ("direction".to_string(), json!(direction)),
                            ]),
                        })
                    }
                    _ => None,
                })
            }
            RuleCondition::RegimeShift { breakpoints, .. } => {
                events.iter().find_map(|event| match event {
                    SignalEvent::RegimeChange {
                        window,
                        from,
                        to,
                        value,
                    } => Some(Trigger {
                        value: *value,
                        threshold: boundary_between(*from, *to, breakpoints),
                        description: format!(
                            "Volatility regime moved from {} to {} ({} window at {:.2})",
                            from, to, window, value
                        ),
                        recommendation: regime_recommendation(*from, *to).to_string(),
                        details: BTreeMap::from([
                            ("from".to_string(), json!(from)),
                            ("to".to_string(), json!(to)),
                            ("window".to_string(), json!(window)),
                        ]),
                    }),
                    _ => None,
                })
            }
        }
    }
}

fn regime_recommendation(from: VolatilityRegime, to: VolatilityRegime) -> &'static str {
    match to {
        VolatilityRegime::Extreme => "Extreme volatility; cut position sizes and widen stops",
        VolatilityRegime::High if to > from => "Volatility rising; reduce leverage",
        _ if to < from => "Volatility easing; normal position sizing can resume",
        _ => "Volatility regime changed; review risk limits",
    }
}
