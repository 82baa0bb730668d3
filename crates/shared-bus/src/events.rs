//! # Realtime Updates
//!
//! The messages carried by the bus and the filters subscribers use.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::IdentityId;

/// Kind of the update pushed when a new event lands in a box.
pub const EVENT_NEW_KIND: &str = "event.new";

/// Channel an identity listens on.
#[must_use]
pub fn user_channel(identity_id: &IdentityId) -> String {
    format!("user_{identity_id}")
}

/// A message pushed to one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeUpdate {
    /// Target channel (`user_<id>`).
    pub channel: String,
    /// Update kind, e.g. `event.new`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload forwarded verbatim to the client.
    pub object: Value,
}

impl RealtimeUpdate {
    pub fn new(channel: impl Into<String>, kind: impl Into<String>, object: Value) -> Self {
        Self {
            channel: channel.into(),
            kind: kind.into(),
            object,
        }
    }

    /// Build an update addressed to an identity's channel.
    pub fn for_identity(identity_id: &IdentityId, kind: impl Into<String>, object: Value) -> Self {
        Self::new(user_channel(identity_id), kind, object)
    }
}

/// Filter for subscribing to a subset of updates.
///
/// Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFilter {
    pub channels: Vec<String>,
    pub kinds: Vec<String>,
}

impl UpdateFilter {
    /// Match every update.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match updates of a single channel.
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channels: vec![channel.into()],
            kinds: Vec::new(),
        }
    }

    /// Match updates addressed to an identity.
    #[must_use]
    pub fn for_identity(identity_id: &IdentityId) -> Self {
        Self::channel(user_channel(identity_id))
    }

    /// Restrict the filter to an update kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    /// Check if an update matches this filter.
    #[must_use]
    pub fn matches(&self, update: &RealtimeUpdate) -> bool {
        let channel_ok = self.channels.is_empty() || self.channels.contains(&update.channel);
        let kind_ok = self.kinds.is_empty() || self.kinds.contains(&update.kind);
        channel_ok && kind_ok
    }

    /// Key used to track subscriptions per filter.
    pub(crate) fn key(&self) -> String {
        format!("{:?}|{:?}", self.channels, self.kinds)
    }
}
