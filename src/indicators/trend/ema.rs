//! EMA (Exponential Moving Average), updated one sample at a time

/// Smoothing factor for a period of `period` ticks.
pub fn alpha(period: u32) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// `EMA(t) = alpha * x(t) + (1 - alpha) * EMA(t-1)`, seeded with the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Ema {
    period: u32,
    value: Option<f64>,
    samples: u64,
}

impl Ema {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            value: None,
            samples: 0,
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Change the period; the current value carries over.
    pub fn set_period(&mut self, period: u32) {
        self.period = period.max(1);
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => {
                let a = alpha(self.period);
                a * x + (1.0 - a) * prev
            }
        };
        self.value = Some(next);
        self.samples += 1;
        next
    }
}
