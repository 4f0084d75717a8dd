//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log records
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression)
    pub log_level: String,

    /// Whether to write log records to stderr at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether the runtime should print the metrics exposition on shutdown
    pub metrics_dump: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tx-radar".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_dump: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RADAR_SERVICE_NAME`: Service name (default: tx-radar)
    /// - `RADAR_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `RADAR_CONSOLE_OUTPUT`: Enable log output (default: true)
    /// - `RADAR_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `RADAR_METRICS_DUMP`: Print metrics on shutdown (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("RADAR_SERVICE_NAME")
                .unwrap_or_else(|_| "tx-radar".to_string()),

            log_level: env::var("RADAR_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("RADAR_CONSOLE_OUTPUT")
                .map(|v| flag_enabled(&v, true))
                .unwrap_or(true),

            json_logs: env::var("RADAR_JSON_LOGS")
                .map(|v| flag_enabled(&v, false))
                .unwrap_or(is_container),

            metrics_dump: env::var("RADAR_METRICS_DUMP")
                .map(|v| flag_enabled(&v, false))
                .unwrap_or(false),
        }
    }
}

/// Interpret a boolean environment flag. Unrecognised values keep `default`.
fn flag_enabled(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
