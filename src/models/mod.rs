//! Shared data models spanning the engine layers.

pub mod alert;
pub mod observation;
pub mod signal;

pub use alert::{Alert, AlertMetadata, AlertType, Severity};
pub use observation::{SourceName, SourceObservation};
pub use signal::{
    CrossDirection, CrossoverPair, EntitySnapshot, SignalEvent, SignalEventRecord, SignalName,
    SignalSnapshot, SignalState, SnapshotLookup, VolatilityRegime, Window, WindowValue,
};
