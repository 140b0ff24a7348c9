//! Built-in `EventSink` implementations.

use crate::error::SinkError;
use crate::services::publisher::{EventSink, PublishEvent};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Writes alerts to the structured log; ignores everything else.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn accepts(&self, event: &PublishEvent) -> bool {
        matches!(event, PublishEvent::Alert(_))
    }

    async fn publish(&self, event: &PublishEvent) -> Result<(), SinkError> {
        if let PublishEvent::Alert(alert) = event {
            info!(
                alert_id = %alert.id,
                entity = %alert.entity,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                signal = %alert.signal_name,
                value = alert.current_value,
                threshold = alert.threshold,
                "{}",
                alert.description
            );
        }
        Ok(())
    }
}

/// In-process broadcast for embedding applications and tests.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<PublishEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, event: &PublishEvent) -> Result<(), SinkError> {
        // No subscribers is not a delivery failure.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// POSTs each event as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    alerts_only: bool,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            alerts_only: true,
        })
    }

    /// Also forward snapshots and detector events.
    pub fn with_all_events(mut self) -> Self {
        self.alerts_only = false;
        self
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn accepts(&self, event: &PublishEvent) -> bool {
        !self.alerts_only || matches!(event, PublishEvent::Alert(_))
    }

    async fn publish(&self, event: &PublishEvent) -> Result<(), SinkError> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// `PUBLISH`es each event on `<prefix>:<kind>`.
#[derive(Clone)]
pub struct RedisSink {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisSink {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    pub fn channel_for(&self, event: &PublishEvent) -> String {
        format!("{}:{}", self.prefix, event.kind())
    }
}

#[async_trait]
impl EventSink for RedisSink {
    fn name(&self) -> &str {
        "redis"
    }

    async fn publish(&self, event: &PublishEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event)?;
        let mut connection = self.connection.clone();
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(self.channel_for(event))
            .arg(payload)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}
