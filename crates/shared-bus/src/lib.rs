//! # Shared Bus - Realtime Fan-out
//!
//! Pushes formatted box events to online identities.
//!
//! ## Channels
//!
//! Every identity listens on its own `user_<identity_id>` channel. The box
//! engine publishes one `RealtimeUpdate` per recipient; a per-connection
//! listener task forwards the updates of its channel to the client.
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐  subscribe()  ┌──────────────┐
//! │  Box engine  │ ─────────────→ │ Realtime bus │ ────────────→ │   Listener   │ ──→ client
//! └──────────────┘                └──────────────┘               └──────────────┘
//! ```
//!
//! ## Delivery
//!
//! - Best effort: updates published while nobody listens are dropped.
//! - Lagging subscribers skip the updates they missed.
//! - Side effects that exhausted their retries are published on `DLQ_CHANNEL`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod listener;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{user_channel, RealtimeUpdate, UpdateFilter, EVENT_NEW_KIND};
pub use listener::{run_listener, ClientFrame, ListenerConfig, ListenerError, ServerFrame};
pub use publisher::{InMemoryRealtimeBus, RealtimePublisher};
pub use subscriber::{Subscription, SubscriptionError, UpdateStream};

/// Maximum updates to buffer per subscriber before the oldest are skipped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Channel receiving side effects that exhausted their retries.
pub const DLQ_CHANNEL: &str = "dlq.after_steps";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
