//! Sentrix: market-sentiment signal fusion and alerting engine.
//!
//! Observations from independent sources are fused per entity into composite
//! signals, smoothed over several windows, scanned for crossovers and regime
//! shifts, and turned into de-duplicated alerts that are fanned out to sinks.

pub mod alerts;
pub mod config;
pub mod core;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod signals;
