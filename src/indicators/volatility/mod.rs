//! Volatility indicators: regime classification

pub mod regime;

pub use regime::*;
