//! Streaming indicator primitives used by the smoothing engine and detector.

pub mod trend;
pub mod volatility;
