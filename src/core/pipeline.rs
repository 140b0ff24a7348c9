//! Synchronous per-entity update pipeline.
//!
//! One `EntityPipeline` is owned by each partition worker and holds the
//! complete state of the entities routed to it: latest observation per
//! source, smoothing series, composite inclusion sets and alert history.
//! `process` runs fusion, smoothing, detection and alert evaluation for one
//! observation before returning, so no reader ever sees half an update.

use crate::alerts::engine::{AlertEngine, SignalInputs};
use crate::config::EngineConfig;
use crate::models::alert::{Alert, AlertType};
use crate::models::observation::{SourceName, SourceObservation};
use crate::models::signal::{
    EntitySnapshot, SignalEvent, SignalEventRecord, SignalName, SignalSnapshot,
};
use crate::signals::crossover::CrossoverDetector;
use crate::signals::fusion::{Composite, FusionEngine, FusionOutcome};
use crate::signals::smoothing::{SmoothingEngine, SmoothingOutcome};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationStatus {
    Processed,
    /// Redelivery of the latest observation of that source.
    Duplicate,
    /// Older than the latest observation of that source.
    OutOfOrder,
    SourceDisabled,
    Invalid,
}

/// What happened to one signal during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalUpdate {
    Applied,
    /// No fresh source; the smoothing state was left alone.
    NoData,
    /// Composite timestamp behind the signal's state.
    Stale,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub entity: String,
    pub status: ObservationStatus,
    pub signals: Vec<(SignalName, SignalUpdate)>,
    pub events: Vec<SignalEventRecord>,
    pub alerts: Vec<Alert>,
    pub suppressed: Vec<AlertType>,
    /// Snapshots of the signals applied in this update.
    pub updated: Vec<SignalSnapshot>,
    /// Full entity snapshot, present when at least one signal was applied.
    pub snapshot: Option<EntitySnapshot>,
}

impl UpdateOutcome {
    fn skipped(entity: &str, status: ObservationStatus) -> Self {
        Self {
            entity: entity.to_string(),
            status,
            signals: Vec::new(),
            events: Vec::new(),
            alerts: Vec::new(),
            suppressed: Vec::new(),
            updated: Vec::new(),
            snapshot: None,
        }
    }

    pub fn applied(&self) -> bool {
        self.snapshot.is_some()
    }
}

pub struct EntityPipeline {
    config: Arc<EngineConfig>,
    fusion: FusionEngine,
    smoothing: SmoothingEngine,
    detector: CrossoverDetector,
    alerts: AlertEngine,
    latest: HashMap<String, BTreeMap<SourceName, SourceObservation>>,
    composites: HashMap<String, BTreeMap<SignalName, Composite>>,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl EntityPipeline {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            fusion: FusionEngine::new(&config),
            smoothing: SmoothingEngine::new(config.windows.clone()),
            detector: CrossoverDetector::new(&config),
            alerts: AlertEngine::new(&config),
            config,
            latest: HashMap::new(),
            composites: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swap configuration between observations. Entity state is kept.
    pub fn reconfigure(&mut self, config: Arc<EngineConfig>) {
        self.fusion = FusionEngine::new(&config);
        self.smoothing.reconfigure(config.windows.clone());
        self.detector = CrossoverDetector::new(&config);
        self.alerts.reconfigure(&config);
        self.config = config;
    }

    pub fn process(&mut self, observation: SourceObservation) -> UpdateOutcome {
        let entity = observation.entity.clone();
        if let Err(e) = observation.validate() {
            warn!(entity = %entity, error = %e, "invalid observation reached pipeline");
            return UpdateOutcome::skipped(&entity, ObservationStatus::Invalid);
        }
        if !self.config.is_source_enabled(observation.source) {
            return UpdateOutcome::skipped(&entity, ObservationStatus::SourceDisabled);
        }

        let now = observation.timestamp;
        let source = observation.source;
        let sources = self.latest.entry(entity.clone()).or_default();
        if let Some(current) = sources.get(&source) {
            if observation.is_redelivery_of(current) {
                return UpdateOutcome::skipped(&entity, ObservationStatus::Duplicate);
            }
            if observation.timestamp < current.timestamp {
                debug!(
                    entity = %entity,
                    source = %source,
                    timestamp = %observation.timestamp,
                    latest = %current.timestamp,
                    "out-of-order observation ignored"
                );
                return UpdateOutcome::skipped(&entity, ObservationStatus::OutOfOrder);
            }
        }
        sources.insert(source, observation);

        let seen = self.last_seen.entry(entity.clone()).or_insert(now);
        if now > *seen {
            *seen = now;
        }

        let mut outcome = UpdateOutcome::skipped(&entity, ObservationStatus::Processed);
        let mut applied: Vec<(SignalName, Composite, Vec<SignalEvent>)> = Vec::new();

        for (signal, weights) in self.config.signals_for(source) {
            let observations = self.latest.get(&entity).into_iter().flat_map(|m| m.values());
            let composite = match self.fusion.fuse(&entity, observations, weights, now) {
                Ok(FusionOutcome::Score(composite)) => composite,
                Ok(FusionOutcome::NoData) => {
                    outcome.signals.push((signal, SignalUpdate::NoData));
                    continue;
                }
                Err(e) => {
                    warn!(entity = %entity, signal = %signal, error = %e, "fusion failed");
                    continue;
                }
            };

            let update = match self.smoothing.update(&entity, signal, composite.value, now) {
                SmoothingOutcome::Applied => SignalUpdate::Applied,
                SmoothingOutcome::Duplicate => SignalUpdate::Duplicate,
                SmoothingOutcome::Stale => SignalUpdate::Stale,
                SmoothingOutcome::Rejected => {
                    warn!(entity = %entity, signal = %signal, "non-finite composite rejected");
                    continue;
                }
            };
            outcome.signals.push((signal, update));
            if update != SignalUpdate::Applied {
                continue;
            }

            let events = self
                .smoothing
                .get(&entity, signal)
                .map(|state| self.detector.detect(state))
                .unwrap_or_default();
            outcome.events.extend(events.iter().map(|event| SignalEventRecord {
                entity: entity.clone(),
                signal,
                timestamp: now,
                event: event.clone(),
            }));
            applied.push((signal, composite, events));
        }

        if applied.is_empty() {
            return outcome;
        }

        let inputs: BTreeMap<SignalName, SignalInputs<'_>> = applied
            .iter()
            .filter_map(|(signal, composite, events)| {
                let state = self.smoothing.get(&entity, *signal)?;
                Some((
                    *signal,
                    SignalInputs {
                        state,
                        composite: Some(composite),
                        events,
                    },
                ))
            })
            .collect();
        let evaluation = self.alerts.evaluate(&entity, &inputs, now);
        drop(inputs);
        outcome.alerts = evaluation.alerts;
        outcome.suppressed = evaluation.suppressed;

        let composites = self.composites.entry(entity.clone()).or_default();
        for (signal, composite, _) in applied {
            composites.insert(signal, composite);
        }

        let snapshot = self.snapshot(&entity);
        if let Some(snapshot) = &snapshot {
            outcome.updated = outcome
                .signals
                .iter()
                .filter(|(_, update)| *update == SignalUpdate::Applied)
                .filter_map(|(signal, _)| snapshot.signals.get(signal).cloned())
                .collect();
        }
        outcome.snapshot = snapshot;
        outcome
    }

    /// Consistent copy of every tracked signal of `entity`.
    pub fn snapshot(&self, entity: &str) -> Option<EntitySnapshot> {
        let composites = self.composites.get(entity);
        let signals: BTreeMap<SignalName, SignalSnapshot> = self
            .smoothing
            .states(entity)
            .map(|state| {
                let composite = composites.and_then(|c| c.get(&state.signal));
                (
                    state.signal,
                    SignalSnapshot {
                        state: state.clone(),
                        contributing_sources: composite.map(Composite::sources).unwrap_or_default(),
                        confidence: composite.map_or(0.0, |c| c.confidence),
                    },
                )
            })
            .collect();

        let updated_at = signals.values().map(|s| s.state.updated_at).max()?;
        Some(EntitySnapshot {
            entity: entity.to_string(),
            updated_at,
            signals,
        })
    }

    /// Drop all state of `entity`. Returns whether anything was tracked.
    pub fn evict_entity(&mut self, entity: &str) -> bool {
        let had_observations = self.latest.remove(entity).is_some();
        let had_series = self.smoothing.evict(entity);
        self.alerts.evict(entity);
        self.composites.remove(entity);
        self.last_seen.remove(entity);
        had_observations || had_series
    }

    /// Evict every entity whose newest observation is older than `cutoff`.
    pub fn evict_idle(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let idle: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| **seen < cutoff)
            .map(|(entity, _)| entity.clone())
            .collect();
        for entity in &idle {
            self.evict_entity(entity);
        }
        idle
    }

    pub fn entity_count(&self) -> usize {
        self.latest.len()
    }

    pub fn last_seen(&self, entity: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(entity).copied()
    }
}
