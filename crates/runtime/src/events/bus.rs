//! Kind-based event bus.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use strum::IntoEnumIterator;
use tokio::sync::broadcast;

use super::types::{EventKind, ProgressionEvent};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Synchronous event consumer.
///
/// Handlers run inside [`EventBus::publish`] on the publisher's task, so they
/// must be quick and must not block.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &ProgressionEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&ProgressionEvent) + Send + Sync,
{
    fn handle(&self, event: &ProgressionEvent) {
        self(event)
    }
}

/// Publish/subscribe seam between the orchestrator and the rest of the
/// application.
pub trait EventBus: Send + Sync {
    /// Delivers `event` to every handler subscribed to its kind before
    /// returning.
    fn publish(&self, event: ProgressionEvent);

    fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId;

    /// Returns false when `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
}

struct Inner {
    handlers: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    channels: HashMap<EventKind, broadcast::Sender<ProgressionEvent>>,
}

/// In-process event bus.
///
/// Handlers registered with [`EventBus::subscribe`] run synchronously during
/// `publish`. Every event is also fanned out to a broadcast channel per kind
/// for asynchronous consumers ([`InMemoryEventBus::subscribe_channel`]).
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Creates a new event bus with default capacity for each kind
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new event bus with specified capacity per kind
    pub fn with_capacity(capacity: usize) -> Self {
        // Pre-create channels for each kind
        let channels = EventKind::iter()
            .map(|kind| (kind, broadcast::channel(capacity.max(1)).0))
            .collect();

        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                channels,
            }),
        }
    }

    /// Subscribe to a specific kind
    ///
    /// Returns a receiver that will only receive events of that kind.
    pub fn subscribe_channel(&self, kind: EventKind) -> broadcast::Receiver<ProgressionEvent> {
        match self.inner.channels.get(&kind) {
            Some(tx) => tx.subscribe(),
            // Every kind gets a channel in `with_capacity`.
            None => broadcast::channel(1).1,
        }
    }

    /// Number of handlers currently subscribed.
    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: ProgressionEvent) {
        let kind = event.kind();

        // Snapshot matching handlers so none runs under the lock.
        let handlers: Vec<Arc<dyn EventHandler>> = match self.inner.handlers.read() {
            Ok(handlers) => handlers
                .iter()
                .filter(|subscription| subscription.kind == kind)
                .map(|subscription| Arc::clone(&subscription.handler))
                .collect(),
            Err(_) => {
                tracing::error!(%kind, "event handler registry lock poisoned");
                Vec::new()
            }
        };

        for handler in handlers {
            handler.handle(&event);
        }

        if let Some(tx) = self.inner.channels.get(&kind)
            && tx.send(event).is_err()
        {
            // No subscribers for this kind - this is normal, not an error
            tracing::trace!("No channel subscribers for {}", kind);
        }
    }

    fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        match self.inner.handlers.write() {
            Ok(mut handlers) => handlers.push(Subscription { id, kind, handler }),
            Err(_) => tracing::error!(%kind, "event handler registry lock poisoned"),
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut handlers) = self.inner.handlers.write() else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|subscription| subscription.id != id);
        handlers.len() != before
    }
}

impl Clone for InMemoryEventBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn unlocked(key: &str) -> ProgressionEvent {
        ProgressionEvent::NodeUnlocked {
            node_key: key.into(),
            level: 1,
        }
    }

    #[test]
    fn handlers_run_synchronously_for_their_kind() {
        let bus = InMemoryEventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.subscribe(
            EventKind::NodeUnlocked,
            Arc::new(move |_: &ProgressionEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(unlocked("a"));
        bus.publish(ProgressionEvent::AllUnlocked {
            message: "done".into(),
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = InMemoryEventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = bus.subscribe(
            EventKind::NodeUnlocked,
            Arc::new(move |_: &ProgressionEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(unlocked("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = InMemoryEventBus::new();
        let inner_bus = bus.clone();
        bus.subscribe(
            EventKind::NodeRelocked,
            Arc::new(move |_: &ProgressionEvent| inner_bus.publish(unlocked("nested"))),
        );
        let mut rx = bus.subscribe_channel(EventKind::NodeUnlocked);

        bus.publish(ProgressionEvent::NodeRelocked {
            node_key: "a".into(),
            level: 1,
        });

        assert_eq!(rx.try_recv().unwrap(), unlocked("nested"));
    }

    #[tokio::test]
    async fn channel_subscribers_receive_their_kind_only() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe_channel(EventKind::AllUnlocked);

        bus.publish(unlocked("a"));
        bus.publish(ProgressionEvent::AllUnlocked {
            message: "done".into(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::AllUnlocked);
        assert!(rx.try_recv().is_err());
    }
}
