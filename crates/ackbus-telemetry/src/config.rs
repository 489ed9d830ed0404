//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for a process embedding ackbus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Filter directive (trace, debug, info, warn, error, or a full EnvFilter string)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to emit ANSI colours in pretty mode
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ackbus".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ACKBUS_SERVICE_NAME`: Service name (default: ackbus)
    /// - `ACKBUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `ACKBUS_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `NO_COLOR`: Disable ANSI colours
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("ACKBUS_SERVICE_NAME").unwrap_or_else(|_| "ackbus".to_string()),

            log_level: env::var("ACKBUS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("ACKBUS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            ansi: env::var("NO_COLOR").is_err(),
        }
    }

    /// Configuration for a named service.
    pub fn for_service(service_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = service_name.to_string();
        config
    }
}
