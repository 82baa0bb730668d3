//! Prometheus metrics for the box engine.
//!
//! All metrics follow the naming convention: `box_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT LOG
    // =========================================================================

    /// Events committed, by type
    pub static ref EVENTS_CREATED: CounterVec = CounterVec::new(
        Opts::new("box_events_created_total", "Events committed to box logs"),
        &["type"]
    ).expect("metric creation failed");

    /// Event creations refused, by error class
    pub static ref EVENTS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("box_events_rejected_total", "Event creations refused before commit"),
        &["type", "class"]  // class: bad_request/forbidden/conflict/not_found/gone/...
    ).expect("metric creation failed");

    /// Members kicked by the sweep
    pub static ref MEMBERS_KICKED: Counter = Counter::new(
        "box_members_kicked_total",
        "Members superseded by a system kick"
    ).expect("metric creation failed");

    // =========================================================================
    // POST-COMMIT SIDE EFFECTS
    // =========================================================================

    /// Side-effect attempts that failed, by step
    pub static ref AFTER_STEP_FAILURES: CounterVec = CounterVec::new(
        Opts::new("box_after_step_failures_total", "Failed post-commit side-effect attempts"),
        &["step"]
    ).expect("metric creation failed");

    /// Side effects moved to the dead-letter list
    pub static ref DEAD_LETTERS: Counter = Counter::new(
        "box_outbox_dead_letters_total",
        "Side effects that exhausted their attempts"
    ).expect("metric creation failed");

    /// Realtime updates pushed to the bus
    pub static ref REALTIME_UPDATES_SENT: Counter = Counter::new(
        "box_realtime_updates_sent_total",
        "Realtime updates published to member channels"
    ).expect("metric creation failed");
}

/// Handle on the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling it more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_CREATED.clone()),
        Box::new(EVENTS_REJECTED.clone()),
        Box::new(MEMBERS_KICKED.clone()),
        Box::new(AFTER_STEP_FAILURES.clone()),
        Box::new(DEAD_LETTERS.clone()),
        Box::new(REALTIME_UPDATES_SENT.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
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
