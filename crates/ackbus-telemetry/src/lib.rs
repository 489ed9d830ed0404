//! # ackbus Telemetry
//!
//! Process-wide logging bootstrap for services built on ackbus. The broker
//! library only emits `tracing` events; installing a subscriber is left to
//! the embedding process, which calls [`init_telemetry`] once at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ackbus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ACKBUS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `ACKBUS_JSON_LOGS` | `false` | JSON lines instead of pretty output |
//! | `ACKBUS_SERVICE_NAME` | `ackbus` | Service name in the startup line |

mod config;
mod logging;

pub use config::TelemetryConfig;

use std::sync::Once;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Install the global tracing subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::Install(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(config.ansi);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::Install(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Logging initialized"
    );

    Ok(())
}

/// Install a test-writer subscriber once per process. Safe to call from
/// every test.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
