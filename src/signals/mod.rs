//! Signal fusion, smoothing and crossover detection.

pub mod crossover;
pub mod fusion;
pub mod smoothing;

pub use crossover::{classify_cross, detect_crossover, detect_regime_change, CrossoverDetector};
pub use fusion::{Composite, Contribution, FusionEngine, FusionOutcome};
pub use smoothing::{SmoothingEngine, SmoothingOutcome};
