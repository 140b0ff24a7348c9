//! Integration tests for sink delivery
//!
//! Uses a wiremock server as the webhook target to exercise retries.

use chrono::{TimeZone, Utc};
use sentrix::config::PublisherSettings;
use sentrix::metrics::Metrics;
use sentrix::models::signal::{
    CrossDirection, CrossoverPair, SignalEvent, SignalEventRecord, SignalName,
};
use sentrix::services::{deliver, ChannelSink, EventSink, LogSink, PublishEvent, Publisher, WebhookSink};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries(max_retries: usize) -> PublisherSettings {
    PublisherSettings {
        max_retries,
        min_backoff_ms: 1,
        max_backoff_ms: 5,
        attempt_timeout_ms: 1_000,
        ..PublisherSettings::default()
    }
}

fn crossover_event() -> PublishEvent {
    PublishEvent::Signal(SignalEventRecord {
        entity: "BTC".to_string(),
        signal: SignalName::CompositeSentiment,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        event: SignalEvent::Crossover {
            pair: CrossoverPair::FastMedium,
            direction: CrossDirection::Bullish,
            leading: 0.2,
            baseline: 0.1,
        },
    })
}

#[tokio::test]
async fn webhook_delivery_retries_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let metrics = Metrics::new().expect("metrics initialization");
    let sink = WebhookSink::new(format!("{}/hook", server.uri()))
        .expect("webhook client")
        .with_all_events();

    let delivered = deliver(&sink, &crossover_event(), &fast_retries(3), &metrics).await;
    assert!(delivered);

    let requests = server.received_requests().await.expect("request recording");
    assert_eq!(requests.len(), 3);
    let body: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
    assert_eq!(body["type"], "signal");
    assert_eq!(body["payload"]["event"]["kind"], "crossover");

    assert_eq!(
        metrics
            .publish_attempts_total
            .with_label_values(&["webhook"])
            .get(),
        3
    );
    assert_eq!(
        metrics
            .publish_failures_total
            .with_label_values(&["webhook"])
            .get(),
        2
    );
}

#[tokio::test]
async fn webhook_delivery_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let metrics = Metrics::new().expect("metrics initialization");
    let sink = WebhookSink::new(server.uri())
        .expect("webhook client")
        .with_all_events();

    let delivered = deliver(&sink, &crossover_event(), &fast_retries(2), &metrics).await;
    assert!(!delivered);

    let requests = server.received_requests().await.expect("request recording");
    assert_eq!(requests.len(), 3);
    assert_eq!(
        metrics
            .publish_dropped_total
            .with_label_values(&["webhook", "retries_exhausted"])
            .get(),
        1
    );
}

#[tokio::test]
async fn alerts_only_webhook_ignores_other_events() {
    let sink = WebhookSink::new("http://127.0.0.1:9/hook").expect("webhook client");
    assert!(!sink.accepts(&crossover_event()));
    assert!(sink.clone().with_all_events().accepts(&crossover_event()));
    assert!(!LogSink.accepts(&crossover_event()));
}

#[tokio::test]
async fn full_lane_drops_and_counts() {
    let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
    let sink = ChannelSink::new(16);
    let mut rx = sink.subscribe();
    let settings = PublisherSettings {
        lane_capacity: 1,
        ..PublisherSettings::default()
    };
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(sink)];
    let publisher = Publisher::start(sinks, &settings, metrics.clone());
    assert_eq!(publisher.sink_names(), vec!["channel".to_string()]);

    // The lane task cannot run until this test yields.
    for _ in 0..3 {
        publisher.publish(crossover_event());
    }
    assert_eq!(
        metrics
            .publish_dropped_total
            .with_label_values(&["channel", "lane_full"])
            .get(),
        2
    );

    publisher.shutdown().await;
    assert_eq!(rx.recv().await.expect("delivered event"), crossover_event());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn disabled_publisher_discards_events() {
    let publisher = Publisher::disabled();
    assert!(publisher.sink_names().is_empty());
    publisher.publish(crossover_event());
    publisher.shutdown().await;
}
