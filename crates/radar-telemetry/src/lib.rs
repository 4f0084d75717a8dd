//! # Radar Telemetry
//!
//! Logging and metrics for the propagation radar.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with an `EnvFilter` and either
//!   a human-readable or JSON formatter
//! - **Metrics**: Prometheus counters, gauges and histograms in a crate-local
//!   registry, exported as text by [`encode_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use radar_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // Library crates now log through the installed subscriber
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RADAR_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `RADAR_JSON_LOGS` | `false` | JSON formatted logs |
//! | `RADAR_CONSOLE_OUTPUT` | `true` | Write logs to stderr |
//! | `RADAR_METRICS_DUMP` | `false` | Print metrics on shutdown |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, BROADCASTS, CALLBACK_LATENCY, PEERS_READY,
    SESSION_OUTCOMES, SIGHTINGS, SLOT_REPLACEMENTS, TRACKED_HASHES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the logging subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
