//! Cron-based scheduler for idle-entity eviction

use crate::core::runtime::SentimentRuntime;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Cron expression firing every `interval_seconds`.
///
/// The step goes into the coarsest field the interval fills, so the value is
/// rounded down to whole minutes, hours or days.
pub fn cron_expression(interval_seconds: u64) -> String {
    match interval_seconds {
        0..=59 => format!("*/{} * * * * *", interval_seconds),
        60..=3_599 => format!("0 */{} * * * *", interval_seconds / 60),
        3_600..=86_399 => format!("0 0 */{} * * *", interval_seconds / 3_600),
        _ => format!("0 0 0 */{} * *", interval_seconds / 86_400),
    }
}

/// Periodically evicts entities that have been idle past the horizon.
pub struct EvictionScheduler {
    runtime: SentimentRuntime,
    schedule: Schedule,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl EvictionScheduler {
    /// Create a scheduler; `interval_seconds == 0` disables it.
    pub fn new(
        runtime: SentimentRuntime,
        interval_seconds: u64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if interval_seconds == 0 {
            return Err("eviction scheduler disabled: interval_seconds is 0".into());
        }

        let cron_expr = cron_expression(interval_seconds);
        let schedule = Schedule::from_str(&cron_expr).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid cron expression '{}': {}", cron_expr, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!(
            interval = interval_seconds,
            cron = %cron_expr,
            "EvictionScheduler: created"
        );

        Ok(Self {
            runtime,
            schedule,
            handle: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn start(&self) {
        let runtime = self.runtime.clone();
        let schedule = self.schedule.clone();

        let handle = tokio::spawn(async move {
            info!("EvictionScheduler: started, waiting for cron schedule...");

            loop {
                let mut upcoming = schedule.upcoming(chrono::Utc);
                if let Some(next_tick) = upcoming.next() {
                    let now = chrono::Utc::now();
                    if next_tick > now {
                        let duration = (next_tick - now).to_std().unwrap_or_default();
                        tokio::time::sleep(duration).await;
                    }
                } else {
                    tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                    continue;
                }

                let horizon = runtime.config().runtime.eviction_horizon();
                match runtime.evict_idle(horizon, chrono::Utc::now()).await {
                    Ok(evicted) => {
                        info!(
                            count = evicted.len(),
                            horizon_secs = horizon.num_seconds(),
                            "EvictionScheduler: sweep complete"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "EvictionScheduler: runtime unavailable, stopping");
                        break;
                    }
                }
            }
        });

        *self.handle.write().await = Some(handle);
        info!("EvictionScheduler: started successfully");
    }

    pub async fn stop(&self) {
        let mut handle = self.handle.write().await;
        if let Some(h) = handle.take() {
            h.abort();
            info!("EvictionScheduler: stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        let handle = self.handle.read().await;
        handle.is_some()
    }
}
