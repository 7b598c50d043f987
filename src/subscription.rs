//! Routing of server pushes to subscribed listeners.
//!
//! Each subscription owns a bounded queue. `dispatch` snapshots the listeners
//! registered for a topic, then delivers without ever awaiting: a slow or
//! abandoned listener has its events dropped (with a warning) instead of
//! stalling the wire reader or other listeners. Listener changes made during
//! a dispatch do not affect that dispatch's snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One pushed event as delivered to a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushEvent {
    /// Topic the server tagged the push with.
    pub topic: String,
    /// JSON event document.
    pub payload: String,
}

struct Listener {
    id: u64,
    tx: mpsc::Sender<PushEvent>,
}

/// An active subscription's receiving end.
///
/// Dropping the subscription (or calling
/// [`SubscriptionRegistry::unsubscribe`]) ends delivery; the registry prunes
/// the dead queue on the next dispatch to its topic.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: String,
    rx: mpsc::Receiver<PushEvent>,
}

impl Subscription {
    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str { &self.topic }

    /// Receive the next pushed event.
    ///
    /// Returns `None` once the subscription has been removed from the
    /// registry (unsubscribe or registry teardown) and the queue is empty.
    pub async fn recv(&mut self) -> Option<PushEvent> { self.rx.recv().await }

    /// Receive without waiting; `None` when no event is queued right now.
    pub fn try_recv(&mut self) -> Option<PushEvent> { self.rx.try_recv().ok() }
}

/// Registry of active subscriptions keyed by topic.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    listeners: DashMap<String, Vec<Listener>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a listener for `topic` with the given queue capacity.
    #[must_use]
    pub fn subscribe(&self, topic: &str, capacity: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.listeners
            .entry(topic.to_owned())
            .or_default()
            .push(Listener { id, tx });
        debug!(topic, id, "listener subscribed");
        Subscription {
            id,
            topic: topic.to_owned(),
            rx,
        }
    }

    /// Remove `subscription`'s listener from the registry.
    ///
    /// Idempotent: unsubscribing an already-removed subscription is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Some(mut entry) = self.listeners.get_mut(&subscription.topic) {
            entry.retain(|listener| listener.id != subscription.id);
        }
        self.listeners
            .remove_if(&subscription.topic, |_, listeners| listeners.is_empty());
    }

    /// Deliver `event` to every listener registered for its topic.
    ///
    /// Never blocks: a listener whose queue is full loses this event with a
    /// warning, and a listener whose receiver is gone is pruned. Returns the
    /// number of listeners that received the event.
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        // Snapshot the senders so listener changes during delivery do not
        // affect this dispatch.
        let snapshot: Vec<(u64, mpsc::Sender<PushEvent>)> = match self.listeners.get(&event.topic)
        {
            Some(entry) => entry
                .iter()
                .map(|listener| (listener.id, listener.tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut dead: Vec<u64> = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic = %event.topic, id, "push queue full; event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            if let Some(mut entry) = self.listeners.get_mut(&event.topic) {
                entry.retain(|listener| !dead.contains(&listener.id));
            }
            self.listeners
                .remove_if(&event.topic, |_, listeners| listeners.is_empty());
        }
        delivered
    }

    /// Drop every listener; their subscriptions see end-of-stream.
    pub fn clear(&self) { self.listeners.clear(); }

    /// Number of live listeners across all topics.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.iter().map(|entry| entry.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(topic: &str, payload: &str) -> PushEvent {
        PushEvent {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_subscribed_listener_exactly_once() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe("stocks", 4);
        assert_eq!(registry.dispatch(&event("stocks", "{}")), 1);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none(), "only one delivery per dispatch");
    }

    #[tokio::test]
    async fn dispatch_ignores_other_topics() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe("stocks", 4);
        assert_eq!(registry.dispatch(&event("orders", "{}")), 0);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let sub = registry.subscribe("stocks", 4);
        registry.unsubscribe(&sub);
        registry.unsubscribe(&sub);
        assert_eq!(registry.dispatch(&event("stocks", "{}")), 0);
        assert_eq!(registry.listener_count(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe("stocks", 1);
        assert_eq!(registry.dispatch(&event("stocks", "first")), 1);
        assert_eq!(registry.dispatch(&event("stocks", "second")), 0);
        assert!(logs_contain("push queue full"));
        assert_eq!(sub.recv().await.expect("first event").payload, "first");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_dispatch() {
        let registry = SubscriptionRegistry::new();
        let sub = registry.subscribe("stocks", 4);
        drop(sub);
        assert_eq!(registry.dispatch(&event("stocks", "{}")), 0);
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn clear_ends_all_subscriptions() {
        let registry = SubscriptionRegistry::new();
        let mut a = registry.subscribe("stocks", 4);
        let mut b = registry.subscribe("orders", 4);
        registry.clear();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn two_listeners_both_receive() {
        let registry = SubscriptionRegistry::new();
        let mut a = registry.subscribe("stocks", 4);
        let mut b = registry.subscribe("stocks", 4);
        assert_eq!(registry.dispatch(&event("stocks", "{}")), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
    }
}
