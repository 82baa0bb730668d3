//! # Box Telemetry
//!
//! Observability for the box engine.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, pretty in
//!   development and JSON in containers.
//! - **Metrics**: Prometheus counters for created events, side-effect failures,
//!   dead letters and realtime pushes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use box_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // logs and metrics are collected from here on
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `box-engine` | Service name attached to logs |
//! | `BOX_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BOX_CONSOLE_OUTPUT` | `true` | Print logs to stdout |
//! | `BOX_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, AFTER_STEP_FAILURES, DEAD_LETTERS,
    EVENTS_CREATED, EVENTS_REJECTED, MEMBERS_KICKED, REALTIME_UPDATES_SENT,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first, they do not depend on the subscriber
    let metrics_handle = register_metrics()?;

    let tracing_guard = tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "box-engine");
    }

    #[test]
    fn test_metric_inc_macro() {
        let before = EVENTS_CREATED.with_label_values(&["msg.text"]).get();
        metric_inc!(EVENTS_CREATED, &["msg.text"]);
        assert!(EVENTS_CREATED.with_label_values(&["msg.text"]).get() >= before + 1.0);
    }
}
