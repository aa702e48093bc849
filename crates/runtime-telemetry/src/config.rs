//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to register the Prometheus collectors
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tx-runtime".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TXR_SERVICE_NAME`: Service name (default: tx-runtime)
    /// - `TXR_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `TXR_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `TXR_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `TXR_METRICS`: Register Prometheus collectors (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("TXR_SERVICE_NAME")
                .unwrap_or_else(|_| "tx-runtime".to_string()),

            log_level: env::var("TXR_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("TXR_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("TXR_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(is_container),

            metrics_enabled: env::var("TXR_METRICS")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),
        }
    }

    /// Configuration for tests: debug level, no JSON, no metric registration.
    pub fn for_tests() -> Self {
        Self {
            log_level: "debug".to_string(),
            metrics_enabled: false,
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}
