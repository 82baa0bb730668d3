//! # Realtime Publisher
//!
//! Defines the publishing side of the bus.

use crate::events::{RealtimeUpdate, UpdateFilter};
use crate::subscriber::{Subscription, UpdateStream};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing updates to the bus.
#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    /// Publish an update.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the update.
    async fn publish(&self, update: RealtimeUpdate) -> usize;

    /// Get the total number of updates published.
    fn updates_published(&self) -> u64;
}

/// In-memory implementation of the bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Suitable for a single process; a multi-node deployment would put a broker
/// behind the same trait.
pub struct InMemoryRealtimeBus {
    /// Broadcast sender for updates.
    sender: broadcast::Sender<RealtimeUpdate>,

    /// Active subscription count by filter.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total updates published.
    updates_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryRealtimeBus {
    /// Create a new bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            updates_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to updates matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: UpdateFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let key = filter.key();

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(key.clone()).or_insert(0) += 1;
        }

        debug!(channels = ?filter.channels, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), key)
    }

    /// Get a stream of updates matching a filter.
    #[must_use]
    pub fn update_stream(&self, filter: UpdateFilter) -> UpdateStream {
        UpdateStream::new(self.subscribe(filter))
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryRealtimeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimePublisher for InMemoryRealtimeBus {
    async fn publish(&self, update: RealtimeUpdate) -> usize {
        let channel = update.channel.clone();
        let kind = update.kind.clone();

        // Count attempts, delivered or not
        self.updates_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(update) {
            Ok(receiver_count) => {
                debug!(
                    channel = %channel,
                    kind = %kind,
                    receivers = receiver_count,
                    "Update published"
                );
                receiver_count
            }
            Err(e) => {
                // Nobody online, the update is dropped
                warn!(
                    channel = %channel,
                    kind = %kind,
                    error = %e,
                    "Update dropped (no receivers)"
                );
                0
            }
        }
    }

    fn updates_published(&self) -> u64 {
        self.updates_published.load(Ordering::Relaxed)
    }
}
