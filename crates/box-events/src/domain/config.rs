//! Engine configuration from environment variables.

use shared_bus::ListenerConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Tunables of the box engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stop access rule evaluation after the first rule inspected.
    pub first_rule_only: bool,

    /// Attempts per post-commit side effect before it is dead-lettered
    pub outbox_max_attempts: u32,

    /// Dead letters kept for replay; the oldest are dropped beyond this
    pub outbox_dead_letter_capacity: usize,

    /// Period of the background outbox drain worker
    pub outbox_drain_interval: Duration,

    /// Capacity of the realtime broadcast channel
    pub realtime_channel_capacity: usize,

    /// Ping period of realtime listeners
    pub realtime_liveness_interval: Duration,

    /// Page size used when a list call gives no limit
    pub default_list_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            first_rule_only: true,
            outbox_max_attempts: 1,
            outbox_dead_letter_capacity: 10_000,
            outbox_drain_interval: Duration::from_millis(500),
            realtime_channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            realtime_liveness_interval: Duration::from_secs(30),
            default_list_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BOX_ACCESS_FIRST_RULE_ONLY`: Stop after the first access rule (default: true)
    /// - `BOX_OUTBOX_MAX_ATTEMPTS`: Side-effect attempts (default: 1)
    /// - `BOX_OUTBOX_DEAD_LETTER_CAPACITY`: Dead letters kept (default: 10000)
    /// - `BOX_OUTBOX_DRAIN_INTERVAL_MS`: Drain worker period (default: 500)
    /// - `BOX_REALTIME_CHANNEL_CAPACITY`: Bus capacity (default: 1000)
    /// - `BOX_REALTIME_LIVENESS_SECS`: Listener ping period (default: 30)
    /// - `BOX_LIST_DEFAULT_LIMIT`: Default page size (default: 50)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            first_rule_only: env::var("BOX_ACCESS_FIRST_RULE_ONLY")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.first_rule_only),

            outbox_max_attempts: parse_var("BOX_OUTBOX_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbox_max_attempts),

            outbox_dead_letter_capacity: parse_var("BOX_OUTBOX_DEAD_LETTER_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbox_dead_letter_capacity),

            outbox_drain_interval: parse_var("BOX_OUTBOX_DRAIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_drain_interval),

            realtime_channel_capacity: parse_var("BOX_REALTIME_CHANNEL_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.realtime_channel_capacity),

            realtime_liveness_interval: parse_var("BOX_REALTIME_LIVENESS_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.realtime_liveness_interval),

            default_list_limit: parse_var("BOX_LIST_DEFAULT_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_list_limit),
        }
    }

    /// Listener settings derived from this configuration.
    #[must_use]
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            liveness_interval: self.realtime_liveness_interval,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
