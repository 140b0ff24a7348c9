//! Unit tests for the per-entity update pipeline

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentrix::config::{CompositeWeightConfig, EngineConfig};
use sentrix::core::pipeline::{EntityPipeline, ObservationStatus, SignalUpdate};
use sentrix::ingest::queue::CoalescingQueue;
use sentrix::models::alert::AlertType;
use sentrix::models::observation::{SourceName, SourceObservation};
use sentrix::models::signal::{SignalEvent, SignalName, SnapshotLookup, VolatilityRegime, Window};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn obs(entity: &str, source: SourceName, value: f64, secs: i64) -> SourceObservation {
    SourceObservation::new(entity, source, value, t0() + Duration::seconds(secs)).unwrap()
}

fn pipeline() -> EntityPipeline {
    EntityPipeline::new(Arc::new(EngineConfig::default()))
}

#[test]
fn test_news_spike_raises_alert() {
    let mut pipeline = pipeline();
    let outcome = pipeline.process(obs("BTC", SourceName::News, 0.78, 0));

    assert_eq!(outcome.status, ObservationStatus::Processed);
    assert_eq!(
        outcome.signals,
        vec![(SignalName::CompositeSentiment, SignalUpdate::Applied)]
    );
    assert_eq!(outcome.alerts.len(), 1);
    let alert = &outcome.alerts[0];
    assert_eq!(alert.alert_type, AlertType::SentimentSpike);
    assert_eq!(alert.current_value, 0.78);
    assert_eq!(alert.metadata.contributing_sources, vec![SourceName::News]);

    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.updated_at, t0());
    assert_eq!(
        snapshot.lookup(SignalName::CompositeSentiment, Window::Fast),
        SnapshotLookup::Value {
            value: 0.78,
            updated_at: t0()
        }
    );
    assert_eq!(outcome.updated.len(), 1);
}

#[test]
fn test_fear_greed_extreme() {
    let mut pipeline = pipeline();
    let outcome = pipeline.process(obs("BTC", SourceName::FearGreed, 15.0, 0));
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].alert_type, AlertType::FearGreedExtreme);
    assert_eq!(outcome.alerts[0].threshold, 20.0);
    assert_eq!(outcome.alerts[0].signal_name, SignalName::FearGreedIndex);
}

#[test]
fn test_volatility_regime_change() {
    let mut pipeline = pipeline();
    let first = pipeline.process(obs("BTC", SourceName::Volatility, 10.0, 0));
    assert!(first.alerts.is_empty());
    assert!(first.events.is_empty());

    let second = pipeline.process(obs("BTC", SourceName::Volatility, 40.0, 60));
    let regime: Vec<&SignalEvent> = second
        .events
        .iter()
        .map(|record| &record.event)
        .filter(|event| matches!(event, SignalEvent::RegimeChange { .. }))
        .collect();
    assert_eq!(regime.len(), 1);
    assert_eq!(
        *regime[0],
        SignalEvent::RegimeChange {
            window: Window::Fast,
            from: VolatilityRegime::Low,
            to: VolatilityRegime::Normal,
            value: 20.0,
        }
    );
    assert_eq!(second.alerts.len(), 1);
    assert_eq!(second.alerts[0].alert_type, AlertType::VolatilityRegimeChange);
    assert_eq!(second.alerts[0].threshold, 15.0);
}

#[test]
fn test_social_volume_anomaly() {
    let mut pipeline = pipeline();
    for i in 0..4 {
        let outcome = pipeline.process(obs("BTC", SourceName::SocialVolume, 100.0, i * 60));
        assert!(outcome.alerts.is_empty());
    }

    let outcome = pipeline.process(obs("BTC", SourceName::SocialVolume, 1_000.0, 240));
    assert_eq!(outcome.alerts.len(), 1);
    let alert = &outcome.alerts[0];
    assert_eq!(alert.alert_type, AlertType::SocialVolumeAnomaly);
    assert_eq!(alert.current_value, 1_000.0);
    assert!((alert.threshold - 840.0).abs() < 1e-9);
}

#[test]
fn test_duplicate_is_ignored() {
    let mut pipeline = pipeline();
    let observation = obs("BTC", SourceName::News, 0.3, 0);
    pipeline.process(observation.clone());

    let outcome = pipeline.process(observation);
    assert_eq!(outcome.status, ObservationStatus::Duplicate);
    assert!(!outcome.applied());
}

#[test]
fn test_out_of_order_leaves_snapshot_unchanged() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.2, 100));
    let before = pipeline.snapshot("BTC").unwrap();

    let outcome = pipeline.process(obs("BTC", SourceName::News, 0.5, 50));
    assert_eq!(outcome.status, ObservationStatus::OutOfOrder);
    assert_eq!(pipeline.snapshot("BTC").unwrap(), before);
}

#[test]
fn test_older_observation_from_other_source_is_stale() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.2, 100));
    let before = pipeline.snapshot("BTC").unwrap();

    let outcome = pipeline.process(obs("BTC", SourceName::Social, -0.4, 50));
    assert_eq!(outcome.status, ObservationStatus::Processed);
    assert_eq!(
        outcome.signals,
        vec![(SignalName::CompositeSentiment, SignalUpdate::Stale)]
    );
    assert!(outcome.snapshot.is_none());
    assert_eq!(pipeline.snapshot("BTC").unwrap(), before);
}

#[test]
fn test_disabled_source_is_skipped() {
    let mut config = EngineConfig::default();
    if let Some(news) = config.sources.get_mut(&SourceName::News) {
        news.enabled = false;
    }
    let mut pipeline = EntityPipeline::new(Arc::new(config));
    let outcome = pipeline.process(obs("BTC", SourceName::News, 0.9, 0));
    assert_eq!(outcome.status, ObservationStatus::SourceDisabled);
    assert!(pipeline.snapshot("BTC").is_none());
}

#[test]
fn test_zero_weight_source_yields_no_data() {
    let mut config = EngineConfig::default();
    config.signals.insert(
        SignalName::CompositeSentiment,
        CompositeWeightConfig::new([(SourceName::News, 1.0), (SourceName::Options, 0.0)]),
    );
    let mut pipeline = EntityPipeline::new(Arc::new(config));

    let outcome = pipeline.process(obs("BTC", SourceName::Options, 0.6, 0));
    assert_eq!(outcome.status, ObservationStatus::Processed);
    assert_eq!(
        outcome.signals,
        vec![(SignalName::CompositeSentiment, SignalUpdate::NoData)]
    );
    assert!(outcome.snapshot.is_none());
    assert!(pipeline.snapshot("BTC").is_none());
}

#[test]
fn test_signals_track_per_entity() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.2, 0));
    pipeline.process(obs("ETH", SourceName::News, -0.2, 0));

    let eth = pipeline.snapshot("ETH").unwrap();
    assert_eq!(
        eth.lookup(SignalName::CompositeSentiment, Window::Medium),
        SnapshotLookup::Value {
            value: -0.2,
            updated_at: t0()
        }
    );
    assert_eq!(
        eth.lookup(SignalName::FearGreedIndex, Window::Fast),
        SnapshotLookup::NoData
    );
    assert_eq!(pipeline.entity_count(), 2);
}

#[test]
fn test_evict_entity_resets_state() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.9, 0));
    assert!(pipeline.evict_entity("BTC"));
    assert!(!pipeline.evict_entity("BTC"));
    assert!(pipeline.snapshot("BTC").is_none());
    assert_eq!(pipeline.last_seen("BTC"), None);

    // Fresh start: cooldown history is gone as well.
    let outcome = pipeline.process(obs("BTC", SourceName::News, 0.9, 10));
    assert_eq!(outcome.alerts.len(), 1);
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.signals[&SignalName::CompositeSentiment].state.updates, 1);
}

#[test]
fn test_evict_idle_uses_newest_observation() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.1, 0));
    pipeline.process(obs("ETH", SourceName::News, 0.1, 0));
    pipeline.process(obs("ETH", SourceName::Social, 0.1, 7_200));

    let evicted = pipeline.evict_idle(t0() + Duration::hours(1));
    assert_eq!(evicted, vec!["BTC".to_string()]);
    assert!(pipeline.snapshot("BTC").is_none());
    assert!(pipeline.snapshot("ETH").is_some());
    assert_eq!(pipeline.last_seen("ETH"), Some(t0() + Duration::hours(2)));
}

#[test]
fn test_reconfigure_applies_new_thresholds() {
    let mut pipeline = pipeline();
    pipeline.process(obs("BTC", SourceName::News, 0.5, 0));

    let mut config = EngineConfig::default();
    if let Some(spike) = config.alerts.get_mut(&AlertType::SentimentSpike) {
        spike.threshold = 0.4;
    }
    pipeline.reconfigure(Arc::new(config));
    assert_eq!(pipeline.config().alerts[&AlertType::SentimentSpike].threshold, 0.4);

    let outcome = pipeline.process(obs("BTC", SourceName::News, 0.45, 60));
    let spikes = outcome
        .alerts
        .iter()
        .filter(|alert| alert.alert_type == AlertType::SentimentSpike)
        .count();
    assert_eq!(spikes, 1);
    // Smoothing state survived the swap.
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.signals[&SignalName::CompositeSentiment].state.updates, 2);
}

#[test]
fn test_draining_coalesced_burst_is_never_stale() {
    let queue = CoalescingQueue::new(16);
    let sources = [SourceName::News, SourceName::Social, SourceName::OrderBook];
    for i in 0..12i64 {
        queue.push(obs("BTC", sources[(i % 3) as usize], 0.1, i));
    }
    queue.push(obs("BTC", SourceName::News, 0.3, 12));

    let mut pipeline = pipeline();
    let mut processed = Vec::new();
    while let Some(observation) = queue.pop() {
        processed.push(observation.timestamp);
        let outcome = pipeline.process(observation);
        assert_eq!(outcome.status, ObservationStatus::Processed);
        assert!(outcome
            .signals
            .iter()
            .all(|(_, update)| *update == SignalUpdate::Applied));
    }

    assert_eq!(processed.len(), 3);
    assert!(processed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(pipeline.last_seen("BTC"), Some(t0() + Duration::seconds(12)));
}
