//! Partitioned runtime around `EntityPipeline`.
//!
//! Entities are hashed onto a fixed number of partitions. Each partition
//! has one worker task, which is the only writer of its entities' state,
//! fed by a coalescing queue plus an unbounded control channel for
//! eviction. Readers go through a concurrent snapshot map that workers
//! replace wholesale after every applied update.

use crate::config::EngineConfig;
use crate::core::pipeline::{EntityPipeline, ObservationStatus, SignalUpdate, UpdateOutcome};
use crate::error::{ConfigError, IngestError};
use crate::ingest::normalizer::RawObservation;
use crate::ingest::queue::{CoalescingQueue, PushOutcome};
use crate::metrics::Metrics;
use crate::models::observation::SourceObservation;
use crate::models::signal::{EntitySnapshot, SignalEvent, SignalName, SnapshotLookup, Window};
use crate::services::publisher::{PublishEvent, Publisher};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Partition index of `entity` among `partitions`.
pub fn partition_for(entity: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    entity.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestReceipt {
    Enqueued,
    /// Replaced a pending observation of the same entity and source.
    Coalesced,
    /// Accepted, but the partition queue was full and its oldest entry was dropped.
    DroppedOldest,
}

enum Control {
    EvictEntity {
        entity: String,
        reply: oneshot::Sender<bool>,
    },
    EvictIdle {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<Vec<String>>,
    },
}

struct Partition {
    queue: Arc<CoalescingQueue>,
    control: mpsc::UnboundedSender<Control>,
}

struct Inner {
    partitions: Vec<Partition>,
    config: watch::Sender<Arc<EngineConfig>>,
    snapshots: Arc<DashMap<String, Arc<EntitySnapshot>>>,
    metrics: Arc<Metrics>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct SentimentRuntime {
    inner: Arc<Inner>,
}

impl SentimentRuntime {
    /// Spawn the partition workers. Must be called inside a tokio runtime.
    pub fn start(
        config: EngineConfig,
        metrics: Arc<Metrics>,
        publisher: Publisher,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let partitions = config.runtime.partitions;
        let capacity = config.runtime.queue_capacity;
        let (config_tx, _) = watch::channel(Arc::new(config));
        let snapshots = Arc::new(DashMap::new());

        let mut slots = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);
        for index in 0..partitions {
            let queue = Arc::new(CoalescingQueue::new(capacity));
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            let worker = Worker {
                index,
                queue: queue.clone(),
                control: control_rx,
                config: config_tx.subscribe(),
                snapshots: snapshots.clone(),
                metrics: metrics.clone(),
                publisher: publisher.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
            slots.push(Partition {
                queue,
                control: control_tx,
            });
        }

        info!(partitions, queue_capacity = capacity, "sentiment runtime started");

        Ok(Self {
            inner: Arc::new(Inner {
                partitions: slots,
                config: config_tx,
                snapshots,
                metrics,
                workers: Mutex::new(workers),
            }),
        })
    }

    fn partition(&self, entity: &str) -> &Partition {
        let index = partition_for(entity, self.inner.partitions.len());
        &self.inner.partitions[index]
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions.len()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Validate and enqueue one observation. Never blocks on processing.
    pub fn ingest(&self, observation: SourceObservation) -> Result<IngestReceipt, IngestError> {
        let metrics = &self.inner.metrics;
        if let Err(e) = observation.validate() {
            metrics
                .observations_rejected_total
                .with_label_values(&["invalid"])
                .inc();
            return Err(e.into());
        }
        if !self.config().is_source_enabled(observation.source) {
            metrics
                .observations_rejected_total
                .with_label_values(&["source_disabled"])
                .inc();
            return Err(IngestError::SourceDisabled(observation.source));
        }

        let source = observation.source;
        let receipt = match self.partition(&observation.entity).queue.push(observation) {
            PushOutcome::Enqueued => IngestReceipt::Enqueued,
            PushOutcome::Coalesced => {
                metrics.queue_coalesced_total.inc();
                IngestReceipt::Coalesced
            }
            PushOutcome::DroppedOldest(dropped) => {
                metrics.queue_dropped_total.inc();
                warn!(
                    entity = %dropped.entity,
                    source = %dropped.source,
                    "partition queue full, dropped oldest observation"
                );
                IngestReceipt::DroppedOldest
            }
            PushOutcome::Closed => return Err(IngestError::Closed),
        };
        metrics
            .observations_ingested_total
            .with_label_values(&[source.as_str()])
            .inc();
        Ok(receipt)
    }

    pub fn ingest_raw(&self, raw: RawObservation) -> Result<IngestReceipt, IngestError> {
        match raw.into_observation() {
            Ok(observation) => self.ingest(observation),
            Err(e) => {
                self.inner
                    .metrics
                    .observations_rejected_total
                    .with_label_values(&["invalid"])
                    .inc();
                Err(e.into())
            }
        }
    }

    pub fn snapshot(&self, entity: &str) -> Option<Arc<EntitySnapshot>> {
        self.inner
            .snapshots
            .get(entity)
            .map(|entry| entry.value().clone())
    }

    pub fn lookup(&self, entity: &str, signal: SignalName, window: Window) -> SnapshotLookup {
        self.snapshot(entity)
            .map(|snapshot| snapshot.lookup(signal, window))
            .unwrap_or(SnapshotLookup::NoData)
    }

    pub fn entities(&self) -> Vec<String> {
        let mut entities: Vec<String> = self
            .inner
            .snapshots
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        entities.sort();
        entities
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.inner.config.borrow().clone()
    }

    /// Replace the configuration. Partition count and queue capacity keep
    /// their start-up values.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let current = self.config();
        if config.runtime.partitions != current.runtime.partitions
            || config.runtime.queue_capacity != current.runtime.queue_capacity
        {
            warn!("partition count and queue capacity changes need a restart");
        }
        self.inner.config.send_replace(Arc::new(config));
        info!("engine configuration replaced");
        Ok(())
    }

    pub async fn evict_entity(&self, entity: &str) -> Result<bool, IngestError> {
        let partition = self.partition(entity);
        partition.queue.purge(entity);
        let (reply, rx) = oneshot::channel();
        partition
            .control
            .send(Control::EvictEntity {
                entity: entity.to_string(),
                reply,
            })
            .map_err(|_| IngestError::Closed)?;
        rx.await.map_err(|_| IngestError::Closed)
    }

    /// Evict entities whose newest observation is older than `now - horizon`.
    pub async fn evict_idle(
        &self,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, IngestError> {
        let cutoff = now - horizon;
        let mut replies = Vec::with_capacity(self.inner.partitions.len());
        for partition in &self.inner.partitions {
            let (reply, rx) = oneshot::channel();
            partition
                .control
                .send(Control::EvictIdle { cutoff, reply })
                .map_err(|_| IngestError::Closed)?;
            replies.push(rx);
        }

        let mut evicted = Vec::new();
        for rx in replies {
            evicted.extend(rx.await.map_err(|_| IngestError::Closed)?);
        }
        evicted.sort();
        Ok(evicted)
    }

    /// Stop accepting observations, drain the queues and wait for workers.
    pub async fn shutdown(&self) {
        for partition in &self.inner.partitions {
            partition.queue.close();
        }
        let workers: Vec<JoinHandle<()>> = self.inner.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "partition worker ended abnormally");
            }
        }
        info!("sentiment runtime stopped");
    }
}

struct Worker {
    index: usize,
    queue: Arc<CoalescingQueue>,
    control: mpsc::UnboundedReceiver<Control>,
    config: watch::Receiver<Arc<EngineConfig>>,
    snapshots: Arc<DashMap<String, Arc<EntitySnapshot>>>,
    metrics: Arc<Metrics>,
    publisher: Publisher,
}

impl Worker {
    async fn run(mut self) {
        let mut pipeline = EntityPipeline::new(self.config.borrow_and_update().clone());
        debug!(partition = self.index, "partition worker started");

        loop {
            if self.config.has_changed().unwrap_or(false) {
                let config = self.config.borrow_and_update().clone();
                pipeline.reconfigure(config);
                debug!(partition = self.index, "partition picked up new configuration");
            }

            tokio::select! {
                biased;
                Some(command) = self.control.recv() => self.apply_control(&mut pipeline, command),
                next = self.queue.recv() => match next {
                    Some(observation) => self.handle(&mut pipeline, observation),
                    None => break,
                },
            }
        }

        debug!(partition = self.index, "partition worker drained");
    }

    fn apply_control(&self, pipeline: &mut EntityPipeline, command: Control) {
        match command {
            Control::EvictEntity { entity, reply } => {
                let evicted = pipeline.evict_entity(&entity);
                if self.snapshots.remove(&entity).is_some() || evicted {
                    self.metrics.entities_evicted_total.inc();
                    info!(entity = %entity, "entity evicted");
                }
                self.metrics.entities_active.set(self.snapshots.len() as i64);
                let _ = reply.send(evicted);
            }
            Control::EvictIdle { cutoff, reply } => {
                let evicted = pipeline.evict_idle(cutoff);
                for entity in &evicted {
                    self.snapshots.remove(entity);
                    self.queue.purge(entity);
                }
                if !evicted.is_empty() {
                    self.metrics.entities_evicted_total.inc_by(evicted.len() as u64);
                    info!(
                        partition = self.index,
                        count = evicted.len(),
                        cutoff = %cutoff,
                        "evicted idle entities"
                    );
                }
                self.metrics.entities_active.set(self.snapshots.len() as i64);
                let _ = reply.send(evicted);
            }
        }
    }

    fn handle(&self, pipeline: &mut EntityPipeline, observation: SourceObservation) {
        let timer = self.metrics.update_duration_seconds.start_timer();
        let outcome = pipeline.process(observation);
        timer.observe_duration();
        self.record(&outcome);
        self.dispatch(pipeline.config(), outcome);
    }

    fn record(&self, outcome: &UpdateOutcome) {
        let metrics = &self.metrics;
        match outcome.status {
            ObservationStatus::Processed => {}
            ObservationStatus::Duplicate => metrics.updates_duplicate_total.inc(),
            ObservationStatus::OutOfOrder => metrics.updates_out_of_order_total.inc(),
            ObservationStatus::SourceDisabled => metrics
                .observations_rejected_total
                .with_label_values(&["source_disabled"])
                .inc(),
            ObservationStatus::Invalid => metrics
                .observations_rejected_total
                .with_label_values(&["invalid"])
                .inc(),
        }

        for (signal, update) in &outcome.signals {
            match update {
                SignalUpdate::Applied => metrics
                    .updates_applied_total
                    .with_label_values(&[signal.as_str()])
                    .inc(),
                SignalUpdate::NoData => metrics.fusion_no_data_total.inc(),
                SignalUpdate::Stale => metrics.updates_out_of_order_total.inc(),
                SignalUpdate::Duplicate => metrics.updates_duplicate_total.inc(),
            }
        }

        for record in &outcome.events {
            let kind = match record.event {
                SignalEvent::Crossover { .. } => "crossover",
                SignalEvent::RegimeChange { .. } => "regime_change",
            };
            metrics.signal_events_total.with_label_values(&[kind]).inc();
        }

        for alert in &outcome.alerts {
            metrics
                .alerts_emitted_total
                .with_label_values(&[alert.alert_type.as_str(), alert.severity.as_str()])
                .inc();
            info!(
                entity = %alert.entity,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                value = alert.current_value,
                threshold = alert.threshold,
                "alert emitted"
            );
        }
        for alert_type in &outcome.suppressed {
            metrics
                .alerts_suppressed_total
                .with_label_values(&[alert_type.as_str()])
                .inc();
        }
    }

    fn dispatch(&self, config: &EngineConfig, outcome: UpdateOutcome) {
        let Some(snapshot) = outcome.snapshot else {
            return;
        };
        self.snapshots
            .insert(outcome.entity.clone(), Arc::new(snapshot));
        self.metrics.entities_active.set(self.snapshots.len() as i64);

        for alert in outcome.alerts {
            self.publisher.publish(PublishEvent::Alert(alert));
        }
        if config.publisher.publish_events {
            for record in outcome.events {
                self.publisher.publish(PublishEvent::Signal(record));
            }
        }
        if config.publisher.publish_snapshots {
            for snapshot in outcome.updated {
                self.publisher.publish(PublishEvent::Snapshot(snapshot));
            }
        }
    }
}
