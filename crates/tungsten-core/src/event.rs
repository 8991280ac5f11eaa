//! Entity change events
//!
//! One `EventBus<T>` is instantiated per entity kind, keeping listener
//! dispatch compile-time typed. Notification is best-effort and
//! fire-after-commit: a listener failure is logged and isolated, never
//! rolled back into the store mutation that produced the event. Dispatch
//! snapshots the listener list before invoking so listeners can subscribe
//! or unsubscribe from within a callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use tungsten_api::OperationContext;

/// What happened to the entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    New,
    Updated,
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::New => write!(f, "NEW"),
            EventKind::Updated => write!(f, "UPDATED"),
            EventKind::Deleted => write!(f, "DELETED"),
        }
    }
}

/// An entity change notification carrying the post-mutation record
#[derive(Clone, Debug)]
pub struct EntityEvent<T> {
    pub kind: EventKind,
    pub value: T,
    pub context: OperationContext,
}

impl<T> EntityEvent<T> {
    pub fn new(value: T, context: OperationContext) -> Self {
        Self {
            kind: EventKind::New,
            value,
            context,
        }
    }

    pub fn updated(value: T, context: OperationContext) -> Self {
        Self {
            kind: EventKind::Updated,
            value,
            context,
        }
    }

    pub fn deleted(value: T, context: OperationContext) -> Self {
        Self {
            kind: EventKind::Deleted,
            value,
            context,
        }
    }
}

/// Trait for handling entity change events
#[async_trait]
pub trait EntityListener<T>: Send + Sync {
    /// Called for every published event; errors are logged and isolated
    async fn on_event(&self, event: &EntityEvent<T>) -> anyhow::Result<()>;
}

/// Unsubscribe handle returned by `EventBus::subscribe`
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

/// Typed event publisher for one entity kind
pub struct EventBus<T> {
    listeners: RwLock<Vec<(u64, Arc<dyn EntityListener<T>>)>>,
    next_id: AtomicU64,
    /// Mirror for ad-hoc subscribers that just want a stream
    broadcast_tx: broadcast::Sender<EntityEvent<T>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            broadcast_tx,
        }
    }

    /// Register a listener; the returned handle removes it again
    pub async fn subscribe(&self, listener: Arc<dyn EntityListener<T>>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.write().await;
        listeners.push((id, listener));
        debug!("registered entity listener {}, total: {}", id, listeners.len());
        Subscription { id }
    }

    /// Remove a previously registered listener
    pub async fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.id);
        listeners.len() < before
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Notify all listeners of an event.
    ///
    /// The listener list is snapshotted under the read lock and invoked
    /// outside it. Each listener failure is logged and does not affect the
    /// others; there is no ordering guarantee between listeners.
    pub async fn publish(&self, event: EntityEvent<T>) {
        let snapshot: Vec<(u64, Arc<dyn EntityListener<T>>)> =
            self.listeners.read().await.clone();

        for (id, listener) in snapshot {
            if let Err(e) = listener.on_event(&event).await {
                warn!("entity listener {} failed on {} event: {:#}", id, event.kind, e);
            }
        }

        // No receivers is fine
        let _ = self.broadcast_tx.send(event);
    }

    /// Subscribe to the raw event stream
    pub fn stream(&self) -> broadcast::Receiver<EntityEvent<T>> {
        self.broadcast_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Widget {
        id: String,
    }

    struct CountingListener {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EntityListener<Widget> for CountingListener {
        async fn on_event(&self, _event: &EntityEvent<Widget>) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl EntityListener<Widget> for FailingListener {
        async fn on_event(&self, _event: &EntityEvent<Widget>) -> anyhow::Result<()> {
            anyhow::bail!("listener exploded")
        }
    }

    fn widget_event(kind: EventKind) -> EntityEvent<Widget> {
        EntityEvent {
            kind,
            value: Widget {
                id: "w-1".to_string(),
            },
            context: OperationContext::new("test"),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_listeners() {
        let bus = EventBus::new(16);
        let first = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        let second = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        bus.subscribe(first.clone()).await;
        bus.subscribe(second.clone()).await;

        bus.publish(widget_event(EventKind::New)).await;

        assert_eq!(first.seen.load(Ordering::SeqCst), 1);
        assert_eq!(second.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_listener_is_isolated() {
        let bus = EventBus::new(16);
        bus.subscribe(Arc::new(FailingListener)).await;
        let counting = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        bus.subscribe(counting.clone()).await;

        bus.publish(widget_event(EventKind::Updated)).await;

        // The failure did not stop delivery to the other listener
        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new(16);
        let listener = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        let subscription = bus.subscribe(listener.clone()).await;
        assert_eq!(bus.listener_count().await, 1);

        assert!(bus.unsubscribe(subscription).await);
        assert_eq!(bus.listener_count().await, 0);

        bus.publish(widget_event(EventKind::Deleted)).await;
        assert_eq!(listener.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_mirror() {
        let bus: EventBus<Widget> = EventBus::new(16);
        let mut stream = bus.stream();

        bus.publish(widget_event(EventKind::New)).await;

        let received = stream.try_recv().unwrap();
        assert_eq!(received.kind, EventKind::New);
        assert_eq!(received.value.id, "w-1");
    }
}
