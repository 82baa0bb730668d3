//! # Realtime Subscriber
//!
//! Defines the subscription side of the bus.

use crate::events::{RealtimeUpdate, UpdateFilter};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{ready, Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was closed.
    #[error("Realtime bus closed")]
    Closed,
}

/// Decrements the per-filter subscription count when dropped.
struct SubscriptionGuard {
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    key: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.key);
            }
        }
        debug!(filter = %self.key, "Subscription dropped");
    }
}

/// A subscription handle for receiving updates.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    receiver: broadcast::Receiver<RealtimeUpdate>,
    filter: UpdateFilter,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<RealtimeUpdate>,
        filter: UpdateFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            guard: SubscriptionGuard { subscriptions, key },
        }
    }

    /// Receive the next update that matches the filter.
    ///
    /// Cancel safe: no matching update is lost if the future is dropped.
    ///
    /// # Returns
    ///
    /// - `Some(update)` - The next matching update
    /// - `None` - The bus was dropped
    pub async fn recv(&mut self) -> Option<RealtimeUpdate> {
        loop {
            let update = match self.receiver.recv().await {
                Ok(u) => u,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some updates dropped");
                    continue;
                }
            };

            if self.filter.matches(&update) {
                return Some(update);
            }
        }
    }

    /// Try to receive the next update without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(update))` - An update was available and matched
    /// - `Ok(None)` - No update available
    /// - `Err(SubscriptionError::Closed)` - The bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<RealtimeUpdate>, SubscriptionError> {
        loop {
            let update = match self.receiver.try_recv() {
                Ok(u) => u,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&update) {
                return Ok(Some(update));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &UpdateFilter {
        &self.filter
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct UpdateStream {
    inner: BroadcastStream<RealtimeUpdate>,
    filter: UpdateFilter,
    _guard: SubscriptionGuard,
}

impl UpdateStream {
    /// Create a new stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription {
            receiver,
            filter,
            guard,
        } = subscription;
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            _guard: guard,
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &UpdateFilter {
        &self.filter
    }
}

impl Stream for UpdateStream {
    type Item = RealtimeUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(update)) => {
                    if self.filter.matches(&update) {
                        return Poll::Ready(Some(update));
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    debug!(lagged = count, "Stream lagged, some updates dropped");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EVENT_NEW_KIND;
    use crate::publisher::{InMemoryRealtimeBus, RealtimePublisher};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryRealtimeBus::new();
        let alice = Uuid::new_v4();
        let mut sub = bus.subscribe(UpdateFilter::for_identity(&alice));

        bus.publish(RealtimeUpdate::for_identity(
            &alice,
            EVENT_NEW_KIND,
            json!({"n": 1}),
        ))
        .await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("update");

        assert_eq!(received.object["n"], 1);
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryRealtimeBus::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut sub = bus.subscribe(UpdateFilter::for_identity(&alice));

        // Addressed to someone else: filtered out
        bus.publish(RealtimeUpdate::for_identity(&bob, EVENT_NEW_KIND, json!({"n": 1})))
            .await;
        bus.publish(RealtimeUpdate::for_identity(&alice, EVENT_NEW_KIND, json!({"n": 2})))
            .await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("update");

        assert_eq!(received.object["n"], 2);
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryRealtimeBus::new();

        {
            let _sub1 = bus.subscribe(UpdateFilter::all());
            let _sub2 = bus.subscribe(UpdateFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = InMemoryRealtimeBus::new();
        let mut sub = bus.subscribe(UpdateFilter::all());

        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_bus_dropped() {
        let bus = InMemoryRealtimeBus::new();
        let mut sub = bus.subscribe(UpdateFilter::all());
        drop(bus);

        assert!(sub.recv().await.is_none());
        assert_eq!(sub.try_recv(), Err(SubscriptionError::Closed));
    }

    #[tokio::test]
    async fn test_update_stream_filters() {
        let bus = InMemoryRealtimeBus::new();
        let alice = Uuid::new_v4();
        let mut stream = bus.update_stream(UpdateFilter::for_identity(&alice));

        bus.publish(RealtimeUpdate::new("user_other", EVENT_NEW_KIND, json!({"n": 1})))
            .await;
        bus.publish(RealtimeUpdate::for_identity(&alice, EVENT_NEW_KIND, json!({"n": 2})))
            .await;

        let received = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("update");
        assert_eq!(received.object["n"], 2);
        assert_eq!(UpdateStream::filter(&stream).channels.len(), 1);
    }
}
