//! Multi-window smoothing of fused signals.
//!
//! Every entity x signal series carries three EMAs (`fast`, `medium`,
//! `slow`) and a time-based rolling mean (`daily`). Updates must arrive in
//! non-decreasing timestamp order; older ones are rejected untouched.

use crate::config::WindowSettings;
use crate::indicators::trend::{Ema, RollingMean};
use crate::models::signal::{SignalName, SignalState, Window, WindowValue};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingOutcome {
    Applied,
    /// Same timestamp and value as the current state.
    Duplicate,
    /// Timestamp older than the current state.
    Stale,
    /// Raw value was not a finite number.
    Rejected,
}

#[derive(Debug, Clone)]
struct Series {
    state: SignalState,
    emas: BTreeMap<Window, Ema>,
    daily: RollingMean,
}

impl Series {
    fn start(
        entity: &str,
        signal: SignalName,
        raw: f64,
        timestamp: DateTime<Utc>,
        settings: &WindowSettings,
    ) -> Self {
        let mut emas = BTreeMap::new();
        let mut windows = BTreeMap::new();
        for window in Window::ALL {
            if let Some(period) = settings.period(window) {
                let mut ema = Ema::new(period);
                let value = ema.update(raw);
                windows.insert(window, window_value(value, timestamp, None, ema.samples()));
                emas.insert(window, ema);
            }
        }

        let mut daily = RollingMean::new(settings.daily_span(), settings.daily_max_samples);
        let mean = daily.push(timestamp, raw);
        windows.insert(
            Window::Daily,
            window_value(mean, timestamp, None, daily.len() as u64),
        );

        Self {
            state: SignalState {
                entity: entity.to_string(),
                signal,
                raw,
                previous_raw: None,
                updated_at: timestamp,
                updates: 1,
                windows,
            },
            emas,
            daily,
        }
    }

    fn apply(&mut self, raw: f64, timestamp: DateTime<Utc>) {
        for (window, ema) in self.emas.iter_mut() {
            let previous = ema.value();
            let value = ema.update(raw);
            self.state.windows.insert(
                *window,
                window_value(value, timestamp, previous, ema.samples()),
            );
        }

        let previous = self.state.value(Window::Daily);
        let mean = self.daily.push(timestamp, raw);
        self.state.windows.insert(
            Window::Daily,
            window_value(mean, timestamp, previous, self.daily.len() as u64),
        );

        self.state.previous_raw = Some(self.state.raw);
        self.state.raw = raw;
        self.state.updated_at = timestamp;
        self.state.updates += 1;
    }

    fn reconfigure(&mut self, settings: &WindowSettings) {
        for (window, ema) in self.emas.iter_mut() {
            if let Some(period) = settings.period(*window) {
                ema.set_period(period);
            }
        }
        self.daily
            .reconfigure(settings.daily_span(), settings.daily_max_samples);
    }
}

fn window_value(
    value: f64,
    updated_at: DateTime<Utc>,
    previous: Option<f64>,
    samples: u64,
) -> WindowValue {
    WindowValue {
        value,
        updated_at,
        previous,
        samples,
    }
}

/// Owns the smoothing state of every entity routed to one partition.
#[derive(Debug, Clone)]
pub struct SmoothingEngine {
    settings: WindowSettings,
    series: HashMap<String, BTreeMap<SignalName, Series>>,
}

impl SmoothingEngine {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            settings,
            series: HashMap::new(),
        }
    }

    /// Swap window settings; existing series keep their values.
    pub fn reconfigure(&mut self, settings: WindowSettings) {
        for signals in self.series.values_mut() {
            for series in signals.values_mut() {
                series.reconfigure(&settings);
            }
        }
        self.settings = settings;
    }

    pub fn update(
        &mut self,
        entity: &str,
        signal: SignalName,
        raw: f64,
        timestamp: DateTime<Utc>,
    ) -> SmoothingOutcome {
        if !raw.is_finite() {
            return SmoothingOutcome::Rejected;
        }

        let signals = self.series.entry(entity.to_string()).or_default();
        match signals.get_mut(&signal) {
            None => {
                signals.insert(
                    signal,
                    Series::start(entity, signal, raw, timestamp, &self.settings),
                );
                SmoothingOutcome::Applied
            }
            Some(series) => {
                if timestamp < series.state.updated_at {
                    return SmoothingOutcome::Stale;
                }
                if timestamp == series.state.updated_at && raw == series.state.raw {
                    return SmoothingOutcome::Duplicate;
                }
                series.apply(raw, timestamp);
                SmoothingOutcome::Applied
            }
        }
    }

    pub fn get(&self, entity: &str, signal: SignalName) -> Option<&SignalState> {
        self.series
            .get(entity)
            .and_then(|signals| signals.get(&signal))
            .map(|series| &series.state)
    }

    pub fn states(&self, entity: &str) -> impl Iterator<Item = &SignalState> + '_ {
        self.series
            .get(entity)
            .into_iter()
            .flat_map(|signals| signals.values().map(|series| &series.state))
    }

    /// Remove every series of `entity`. Other entities are untouched.
    pub fn evict(&mut self, entity: &str) -> bool {
        self.series.remove(entity).is_some()
    }

    pub fn entity_count(&self) -> usize {
        self.series.len()
    }
}
