//! Trend smoothing: EMA, rolling SMA

pub mod ema;
pub mod sma;

pub use ema::*;
pub use sma::*;
