//! Prometheus metrics for the engine and its HTTP surface.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    pub observations_ingested_total: IntCounterVec,
    pub observations_rejected_total: IntCounterVec,
    pub queue_coalesced_total: IntCounter,
    pub queue_dropped_total: IntCounter,
    pub updates_out_of_order_total: IntCounter,
    pub updates_duplicate_total: IntCounter,
    pub fusion_no_data_total: IntCounter,
    pub updates_applied_total: IntCounterVec,
    pub update_duration_seconds: Histogram,
    pub signal_events_total: IntCounterVec,
    pub alerts_emitted_total: IntCounterVec,
    pub alerts_suppressed_total: IntCounterVec,
    pub publish_attempts_total: IntCounterVec,
    pub publish_failures_total: IntCounterVec,
    pub publish_dropped_total: IntCounterVec,
    pub entities_active: IntGauge,
    pub entities_evicted_total: IntCounter,

    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let observations_ingested_total = IntCounterVec::new(
            Opts::new("observations_ingested_total", "Observations accepted at ingestion"),
            &["source"],
        )?;
        let observations_rejected_total = IntCounterVec::new(
            Opts::new("observations_rejected_total", "Observations rejected at ingestion"),
            &["reason"],
        )?;
        let queue_coalesced_total = IntCounter::new(
            "queue_coalesced_total",
            "Pending observations replaced by a newer one from the same source",
        )?;
        let queue_dropped_total = IntCounter::new(
            "queue_dropped_total",
            "Oldest pending observations dropped because a partition queue was full",
        )?;
        let updates_out_of_order_total = IntCounter::new(
            "updates_out_of_order_total",
            "Observations or signal updates older than the current state",
        )?;
        let updates_duplicate_total = IntCounter::new(
            "updates_duplicate_total",
            "Redelivered observations treated as no-ops",
        )?;
        let fusion_no_data_total = IntCounter::new(
            "fusion_no_data_total",
            "Fusions skipped because no source was fresh",
        )?;
        let updates_applied_total = IntCounterVec::new(
            Opts::new("signal_updates_applied_total", "Smoothing updates applied"),
            &["signal"],
        )?;
        let update_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "entity_update_duration_seconds",
                "Time to run one observation through the entity pipeline",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.05, 0.1, 0.5]),
        )?;
        let signal_events_total = IntCounterVec::new(
            Opts::new("signal_events_total", "Crossover and regime events detected"),
            &["kind"],
        )?;
        let alerts_emitted_total = IntCounterVec::new(
            Opts::new("alerts_emitted_total", "Alerts emitted"),
            &["alert_type", "severity"],
        )?;
        let alerts_suppressed_total = IntCounterVec::new(
            Opts::new("alerts_suppressed_total", "Alert conditions suppressed by cooldown"),
            &["alert_type"],
        )?;
        let publish_attempts_total = IntCounterVec::new(
            Opts::new("publish_attempts_total", "Publish attempts per sink"),
            &["sink"],
        )?;
        let publish_failures_total = IntCounterVec::new(
            Opts::new("publish_failures_total", "Failed publish attempts per sink"),
            &["sink"],
        )?;
        let publish_dropped_total = IntCounterVec::new(
            Opts::new("publish_dropped_total", "Events dropped before reaching a sink"),
            &["sink", "reason"],
        )?;
        let entities_active = IntGauge::new("entities_active", "Entities with tracked state")?;
        let entities_evicted_total =
            IntCounter::new("entities_evicted_total", "Entities evicted from the engine")?;

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total number of HTTP requests")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently being served")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency",
        ))?;

        registry.register(Box::new(observations_ingested_total.clone()))?;
        registry.register(Box::new(observations_rejected_total.clone()))?;
        registry.register(Box::new(queue_coalesced_total.clone()))?;
        registry.register(Box::new(queue_dropped_total.clone()))?;
        registry.register(Box::new(updates_out_of_order_total.clone()))?;
        registry.register(Box::new(updates_duplicate_total.clone()))?;
        registry.register(Box::new(fusion_no_data_total.clone()))?;
        registry.register(Box::new(updates_applied_total.clone()))?;
        registry.register(Box::new(update_duration_seconds.clone()))?;
        registry.register(Box::new(signal_events_total.clone()))?;
        registry.register(Box::new(alerts_emitted_total.clone()))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;
        registry.register(Box::new(publish_attempts_total.clone()))?;
        registry.register(Box::new(publish_failures_total.clone()))?;
        registry.register(Box::new(publish_dropped_total.clone()))?;
        registry.register(Box::new(entities_active.clone()))?;
        registry.register(Box::new(entities_evicted_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            observations_ingested_total,
            observations_rejected_total,
            queue_coalesced_total,
            queue_dropped_total,
            updates_out_of_order_total,
            updates_duplicate_total,
            fusion_no_data_total,
            updates_applied_total,
            update_duration_seconds,
            signal_events_total,
            alerts_emitted_total,
            alerts_suppressed_total,
            publish_attempts_total,
            publish_failures_total,
            publish_dropped_total,
            entities_active,
            entities_evicted_total,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
