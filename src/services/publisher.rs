//! Non-blocking fan-out of alerts, snapshots and detector events to sinks.
//!
//! Every sink gets its own bounded lane and delivery task. Workers only ever
//! `try_send` into a lane; a full lane drops the event and counts it. The
//! lane task delivers with a per-attempt timeout and exponential backoff,
//! then gives up and counts the drop.

use crate::config::PublisherSettings;
use crate::error::SinkError;
use crate::metrics::Metrics;
use crate::models::alert::Alert;
use crate::models::signal::{SignalEventRecord, SignalSnapshot};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PublishEvent {
    Alert(Alert),
    Snapshot(SignalSnapshot),
    Signal(SignalEventRecord),
}

impl PublishEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PublishEvent::Alert(_) => "alert",
            PublishEvent::Snapshot(_) => "snapshot",
            PublishEvent::Signal(_) => "signal",
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            PublishEvent::Alert(alert) => &alert.entity,
            PublishEvent::Snapshot(snapshot) => &snapshot.state.entity,
            PublishEvent::Signal(record) => &record.entity,
        }
    }
}

/// Destination for published events.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this sink wants `event` at all. Defaults to everything.
    fn accepts(&self, _event: &PublishEvent) -> bool {
        true
    }

    async fn publish(&self, event: &PublishEvent) -> Result<(), SinkError>;
}

struct Lane {
    sink: Arc<dyn EventSink>,
    tx: mpsc::Sender<Arc<PublishEvent>>,
}

/// Cloneable handle over all sink lanes.
///
/// Lanes close once every handle is dropped; [`Publisher::shutdown`] then
/// waits for the delivery tasks to flush.
#[derive(Clone)]
pub struct Publisher {
    lanes: Arc<Vec<Lane>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl Publisher {
    /// Spawn one delivery task per sink. Must be called inside a tokio runtime.
    pub fn start(
        sinks: Vec<Arc<dyn EventSink>>,
        settings: &PublisherSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut lanes = Vec::with_capacity(sinks.len());
        let mut tasks = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let (tx, rx) = mpsc::channel(settings.lane_capacity.max(1));
            tasks.push(tokio::spawn(run_lane(
                sink.clone(),
                rx,
                settings.clone(),
                metrics.clone(),
            )));
            lanes.push(Lane { sink, tx });
        }

        Self {
            lanes: Arc::new(lanes),
            tasks: Arc::new(Mutex::new(tasks)),
            metrics: Some(metrics),
        }
    }

    /// Publisher without sinks; every event is discarded.
    pub fn disabled() -> Self {
        Self {
            lanes: Arc::new(Vec::new()),
            tasks: Arc::new(Mutex::new(Vec::new())),
            metrics: None,
        }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.lanes
            .iter()
            .map(|lane| lane.sink.name().to_string())
            .collect()
    }

    /// Hand `event` to every interested sink without waiting.
    pub fn publish(&self, event: PublishEvent) {
        let event = Arc::new(event);
        for lane in self.lanes.iter() {
            if !lane.sink.accepts(&event) {
                continue;
            }
            let reason = match lane.tx.try_send(event.clone()) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "lane_full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            warn!(
                sink = lane.sink.name(),
                kind = event.kind(),
                entity = event.entity(),
                reason,
                "publish event dropped"
            );
            if let Some(metrics) = &self.metrics {
                metrics
                    .publish_dropped_total
                    .with_label_values(&[lane.sink.name(), reason])
                    .inc();
            }
        }
    }

    /// Release this handle and wait for the lanes to drain.
    ///
    /// Lanes only finish once every other clone is gone too, so stop the
    /// runtime first.
    pub async fn shutdown(self) {
        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        drop(self);
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "publisher lane ended abnormally");
            }
        }
    }
}

async fn run_lane(
    sink: Arc<dyn EventSink>,
    mut rx: mpsc::Receiver<Arc<PublishEvent>>,
    settings: PublisherSettings,
    metrics: Arc<Metrics>,
) {
    debug!(sink = sink.name(), "publisher lane started");
    while let Some(event) = rx.recv().await {
        deliver(sink.as_ref(), &event, &settings, &metrics).await;
    }
    debug!(sink = sink.name(), "publisher lane closed");
}

/// Deliver one event with retries. Returns whether it got through.
pub async fn deliver(
    sink: &dyn EventSink,
    event: &PublishEvent,
    settings: &PublisherSettings,
    metrics: &Metrics,
) -> bool {
    let name = sink.name();
    let attempt_timeout = Duration::from_millis(settings.attempt_timeout_ms);
    let timeout_ms = settings.attempt_timeout_ms;

    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(settings.min_backoff_ms))
        .with_max_delay(Duration::from_millis(settings.max_backoff_ms))
        .with_max_times(settings.max_retries);

    let attempt = || async move {
        metrics.publish_attempts_total.with_label_values(&[name]).inc();
        match tokio::time::timeout(attempt_timeout, sink.publish(event)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(timeout_ms)),
        }
    };

    let result = attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|err: &SinkError, delay: Duration| {
            metrics.publish_failures_total.with_label_values(&[name]).inc();
            warn!(
                sink = name,
                kind = event.kind(),
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "publish attempt failed, retrying"
            );
        })
        .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            metrics.publish_failures_total.with_label_values(&[name]).inc();
            metrics
                .publish_dropped_total
                .with_label_values(&[name, "retries_exhausted"])
                .inc();
            error!(
                sink = name,
                kind = event.kind(),
                entity = event.entity(),
                error = %e,
                "giving up on publish event"
            );
            false
        }
    }
}
