//! Prometheus metrics for the propagation radar.
//!
//! All metrics follow the naming convention: `radar_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., radar_broadcasts_total)
//! - **Gauge**: Value that can go up or down (e.g., radar_peers_ready)
//! - **Histogram**: Distribution of values (e.g., callback latency)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Crate-local metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PEER METRICS
    // =========================================================================

    /// Sessions currently Ready
    pub static ref PEERS_READY: Gauge = Gauge::new(
        "radar_peers_ready",
        "Number of peer sessions that completed the handshake and are live"
    ).expect("metric creation failed");

    /// Session outcomes
    pub static ref SESSION_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("radar_sessions_total", "Peer session lifecycle outcomes"),
        &["outcome"]  // outcome: ready/failed/closed
    ).expect("metric creation failed");

    /// Replacement sessions spawned after a failure
    pub static ref SLOT_REPLACEMENTS: Counter = Counter::new(
        "radar_slot_replacements_total",
        "Sessions spawned to replace a failed or closed peer"
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSACTION METRICS
    // =========================================================================

    /// Sightings by kind
    pub static ref SIGHTINGS: CounterVec = CounterVec::new(
        Opts::new("radar_sightings_total", "Transaction announcements observed"),
        &["kind"]  // kind: first/new_peer/duplicate
    ).expect("metric creation failed");

    /// Broadcasts issued
    pub static ref BROADCASTS: Counter = Counter::new(
        "radar_broadcasts_total",
        "Transactions broadcast by the radar"
    ).expect("metric creation failed");

    /// Hashes currently tracked
    pub static ref TRACKED_HASHES: Gauge = Gauge::new(
        "radar_tracked_hashes",
        "Distinct transaction hashes held by the inventory tracker"
    ).expect("metric creation failed");

    // =========================================================================
    // DISPATCH METRICS
    // =========================================================================

    /// Time from event publication to callback completion
    pub static ref CALLBACK_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "radar_callback_latency_seconds",
            "Time from event publication until the caller callback returned"
        ).buckets(
            exponential_buckets(0.00001, 2.0, 16).expect("bucket creation failed")
        )
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`]. Calling it again is harmless.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Peers
        Box::new(PEERS_READY.clone()),
        Box::new(SESSION_OUTCOMES.clone()),
        Box::new(SLOT_REPLACEMENTS.clone()),
        // Transactions
        Box::new(SIGHTINGS.clone()),
        Box::new(BROADCASTS.clone()),
        Box::new(TRACKED_HASHES.clone()),
        // Dispatch
        Box::new(CALLBACK_LATENCY.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Timer whose observation covers the time since `start`.
    pub fn since(histogram: &Histogram, start: std::time::Instant) -> Self {
        Self {
            histogram: histogram.clone(),
            start,
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
