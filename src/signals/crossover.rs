//! Crossover and regime detection on a freshly updated signal.
//!
//! The detector reads the new and previous window values carried by
//! `SignalState`; it keeps no history of its own.

use crate::config::{DetectorSettings, EngineConfig, RegimeSettings};
use crate::indicators::volatility::classify_volatility;
use crate::models::signal::{CrossDirection, CrossoverPair, SignalEvent, SignalState};

/// Direction of a strict crossing between two consecutive differences.
///
/// `d_prev <= 0 < d_new` is bullish, `d_prev >= 0 > d_new` is bearish. Landing
/// exactly on a tie is never a crossing.
pub fn classify_cross(d_prev: f64, d_new: f64) -> Option<CrossDirection> {
    if d_prev <= 0.0 && d_new > 0.0 {
        Some(CrossDirection::Bullish)
    } else if d_prev >= 0.0 && d_new < 0.0 {
        Some(CrossDirection::Bearish)
    } else {
        None
    }
}

/// Crossover of `pair` between the previous and current update, if any.
pub fn detect_crossover(state: &SignalState, pair: CrossoverPair) -> Option<SignalEvent> {
    let (leading_window, baseline_window) = pair.windows();
    let leading = state.window(leading_window)?;
    let baseline = state.window(baseline_window)?;

    let d_prev = leading.previous? - baseline.previous?;
    let d_new = leading.value - baseline.value;

    classify_cross(d_prev, d_new).map(|direction| SignalEvent::Crossover {
        pair,
        direction,
        leading: leading.value,
        baseline: baseline.value,
    })
}

/// Volatility bucket change of the configured window, if any.
pub fn detect_regime_change(state: &SignalState, regime: &RegimeSettings) -> Option<SignalEvent> {
    let current = state.window(regime.window)?;
    let previous = current.previous?;

    let from = classify_volatility(previous, &regime.breakpoints);
    let to = classify_volatility(current.value, &regime.breakpoints);
    (from != to).then_some(SignalEvent::RegimeChange {
        window: regime.window,
        from,
        to,
        value: current.value,
    })
}

#[derive(Debug, Clone)]
pub struct CrossoverDetector {
    detector: DetectorSettings,
    regime: RegimeSettings,
}

impl CrossoverDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            detector: config.detector.clone(),
            regime: config.regime.clone(),
        }
    }

    /// All events for `state`, crossovers first in pair order.
    pub fn detect(&self, state: &SignalState) -> Vec<SignalEvent> {
        let mut events = Vec::new();

        if state.updates > self.detector.warmup_updates {
            events.extend(
                CrossoverPair::ALL
                    .into_iter()
                    .filter_map(|pair| detect_crossover(state, pair)),
            );
        }

        if state.signal == self.regime.signal {
            events.extend(detect_regime_change(state, &self.regime));
        }

        events
    }
}
