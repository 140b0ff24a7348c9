//! Time-based rolling SMA over a trailing span

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Simple moving average of the samples inside `[now - span, now]`.
///
/// The buffer holds at most `max_samples` entries; when full, the oldest
/// sample goes first even if it is still inside the span.
#[derive(Debug, Clone)]
pub struct RollingMean {
    span: Duration,
    max_samples: usize,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl RollingMean {
    pub fn new(span: Duration, max_samples: usize) -> Self {
        Self {
            span,
            max_samples: max_samples.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn reconfigure(&mut self, span: Duration, max_samples: usize) {
        self.span = span;
        self.max_samples = max_samples.max(1);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Add a sample, prune, and return the mean over what is retained.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) -> f64 {
        self.samples.push_back((timestamp, value));
        self.prune(timestamp);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        self.mean().unwrap_or(value)
    }

    /// Drop samples strictly older than `now - span`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|(_, v)| v).sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
