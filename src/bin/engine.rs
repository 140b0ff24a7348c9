//! Sentrix Signal Engine
//!
//! Runs the partitioned fusion/alerting runtime, the publisher sinks, the
//! idle-entity eviction scheduler and the HTTP query surface in one process.

use dotenvy::dotenv;
use sentrix::config::{get_environment, get_redis_url, EngineConfig};
use sentrix::core::http::{start_server, AppState};
use sentrix::core::runtime::SentimentRuntime;
use sentrix::core::scheduler::EvictionScheduler;
use sentrix::logging;
use sentrix::metrics::Metrics;
use sentrix::services::publisher::{EventSink, Publisher};
use sentrix::services::sinks::{LogSink, RedisSink, WebhookSink};
use std::env;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let environment = get_environment();
    info!("Starting Sentrix Signal Engine");
    info!(environment = %environment, "Environment");

    let config = EngineConfig::from_env()?;
    info!(
        partitions = config.runtime.partitions,
        queue_capacity = config.runtime.queue_capacity,
        signals = config.signals.len(),
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(LogSink)];
    if let Ok(url) = env::var("ALERT_WEBHOOK_URL") {
        match WebhookSink::new(url.clone()) {
            Ok(sink) => {
                info!(url = %url, "Webhook sink enabled");
                sinks.push(Arc::new(sink));
            }
            Err(e) => warn!(error = %e, "Failed to build webhook sink"),
        }
    }
    if env::var("REDIS_URL").is_ok() {
        let redis_url = get_redis_url();
        match RedisSink::connect(&redis_url, "sentrix").await {
            Ok(sink) => {
                info!("Redis sink enabled");
                sinks.push(Arc::new(sink));
            }
            Err(e) => warn!(error = %e, "Failed to connect Redis sink, continuing without it"),
        }
    }

    let publisher = Publisher::start(sinks, &config.publisher, metrics.clone());
    info!(sinks = ?publisher.sink_names(), "Publisher started");

    let eviction_interval = config.runtime.eviction_interval_secs;
    let runtime = SentimentRuntime::start(config, metrics, publisher.clone())?;

    let scheduler = match EvictionScheduler::new(runtime.clone(), eviction_interval) {
        Ok(scheduler) => {
            scheduler.start().await;
            Some(scheduler)
        }
        Err(e) => {
            info!(reason = %e, "Eviction scheduler not started");
            None
        }
    };

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let state = AppState::new(runtime.clone());
    let mut server_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.await;
        };
        if let Err(e) = start_server(port, state, shutdown).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!(port = port, "Engine started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down engine...");
        }
        _ = &mut server_handle => {
            error!("HTTP server stopped");
        }
    }

    if let Some(scheduler) = &scheduler {
        scheduler.stop().await;
    }
    let _ = stop_tx.send(());
    let _ = server_handle.await;

    runtime.shutdown().await;
    drop(runtime);
    publisher.shutdown().await;

    info!("Engine stopped");
    Ok(())
}
