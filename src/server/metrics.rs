//! Prometheus metrics for the rollout controller
//!
//! Exposes controller self-observability:
//! - Tick counts by outcome
//! - Tick duration histogram
//! - Active-canary gauges by state
//! - Traffic weight gauge

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Controller metrics registry
///
/// Thread-safe container for all metrics. Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    /// Total ticks by outcome (success, error, skipped)
    pub ticks_total: IntCounterVec,
    /// Tick duration in seconds
    pub tick_duration_seconds: HistogramVec,
    /// Active canaries by state
    pub canaries_active: IntGaugeVec,
    /// Traffic weight per canary (0-100)
    pub traffic_weight: IntGaugeVec,
}

impl ControllerMetrics {
    /// Create a new metrics registry with all controller metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let ticks_total = IntCounterVec::new(
            Opts::new("vaaka_ticks_total", "Total number of canary ticks"),
            &["result"], // success, error, skipped
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vaaka_tick_duration_seconds",
                "Duration of a canary tick in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        let canaries_active = IntGaugeVec::new(
            Opts::new("vaaka_canaries_active", "Number of canaries by rollout state"),
            &["state"],
        )?;
        registry.register(Box::new(canaries_active.clone()))?;

        let traffic_weight = IntGaugeVec::new(
            Opts::new(
                "vaaka_traffic_weight",
                "Current canary traffic weight percentage",
            ),
            &["namespace", "canary"],
        )?;
        registry.register(Box::new(traffic_weight.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            tick_duration_seconds,
            canaries_active,
            traffic_weight,
        })
    }

    /// Record a tick that completed without error
    pub fn record_tick_success(&self, duration_secs: f64) {
        self.ticks_total.with_label_values(&["success"]).inc();
        self.tick_duration_seconds
            .with_label_values(&["success"])
            .observe(duration_secs);
    }

    /// Record a tick that ended in an error
    pub fn record_tick_error(&self, duration_secs: f64) {
        self.ticks_total.with_label_values(&["error"]).inc();
        self.tick_duration_seconds
            .with_label_values(&["error"])
            .observe(duration_secs);
    }

    /// Record a tick that was skipped (not leader, or previous tick still in flight)
    pub fn record_tick_skipped(&self) {
        self.ticks_total.with_label_values(&["skipped"]).inc();
    }

    /// Update traffic weight for a canary
    pub fn set_traffic_weight(&self, namespace: &str, canary: &str, weight: i64) {
        self.traffic_weight
            .with_label_values(&[namespace, canary])
            .set(weight);
    }

    /// Update active canary count for a rollout state
    pub fn set_canaries_active(&self, state: &str, count: i64) {
        self.canaries_active.with_label_values(&[state]).set(count);
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle for use across the controller
pub type SharedMetrics = Arc<ControllerMetrics>;

/// Create a new shared metrics instance
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}
