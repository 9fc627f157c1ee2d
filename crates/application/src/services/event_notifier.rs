//! Event Notifier - In-process publish/subscribe registry
//!
//! Every component receives the same notifier instance instead of
//! broadcasting through global state. Handlers run synchronously on the
//! publishing task, outside the registry lock, so a handler may itself
//! subscribe, unsubscribe or publish.

use std::{collections::HashMap, sync::Arc};

use domain::{SyncEvent, SyncEventKind};
use parking_lot::RwLock;
use tracing::trace;

/// A subscribed callback; identity is the `Arc` allocation
pub type EventHandler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Publish/subscribe registry keyed by event kind
#[derive(Default)]
pub struct EventNotifier {
    handlers: RwLock<HashMap<SyncEventKind, Vec<EventHandler>>>,
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventNotifier")
            .field("kinds", &handlers.len())
            .field(
                "handlers",
                &handlers.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl EventNotifier {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    ///
    /// # Returns
    /// false if this handler was already registered for the kind
    pub fn subscribe(&self, kind: SyncEventKind, handler: EventHandler) -> bool {
        let mut handlers = self.handlers.write();
        let entry = handlers.entry(kind).or_default();
        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        entry.push(handler);
        true
    }

    /// Remove a handler from one event kind
    ///
    /// # Returns
    /// false if the handler was not registered for the kind
    pub fn unsubscribe(&self, kind: SyncEventKind, handler: &EventHandler) -> bool {
        let mut handlers = self.handlers.write();
        let Some(entry) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = entry.len() != before;
        if entry.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    /// Deliver an event to every handler subscribed to its kind
    pub fn publish(&self, event: &SyncEvent) {
        let kind = event.kind();
        let targets: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&kind)
            .map(|handlers| handlers.to_vec())
            .unwrap_or_default();

        trace!(event = %kind, subscribers = targets.len(), "Publishing event");
        for handler in targets {
            handler(event);
        }
    }

    /// Number of handlers subscribed to a kind
    pub fn subscriber_count(&self, kind: SyncEventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}
