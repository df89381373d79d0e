//! Local pub/sub fan-out of inbound events.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{trace, warn};

use harborlink_protocol::events;

use crate::transport::TransportEvent;
use crate::types::ConnectionState;

/// Event delivered to local handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Anything the transport raised: lifecycle, auth, rooms, push topics.
    Transport(TransportEvent),
    /// The connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::Transport(ev) => ev.name(),
            Event::StateChanged { .. } => events::STATE_CHANGED,
        }
    }

    /// Event data in its wire shape.
    pub fn data(&self) -> Value {
        match self {
            Event::Transport(ev) => ev.data(),
            Event::StateChanged { from, to } => json!({ "from": from, "to": to }),
        }
    }
}

/// Local event handler.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identity of a registered handler, unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Event name → handlers. Handlers for one event run in no particular order.
#[derive(Default)]
pub struct Dispatcher {
    listeners: HashMap<String, HashMap<HandlerId, Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its id.
    pub fn subscribe(&mut self, event: impl Into<String>, handler: Handler) -> HandlerId {
        let id = HandlerId::next();
        self.subscribe_with_id(event, id, handler);
        id
    }

    /// Registers a handler under a caller-chosen id.
    pub fn subscribe_with_id(&mut self, event: impl Into<String>, id: HandlerId, handler: Handler) {
        self.listeners
            .entry(event.into())
            .or_default()
            .insert(id, handler);
    }

    /// Removes one handler, or every handler for `event` when `id` is `None`.
    /// Returns how many handlers were removed.
    pub fn unsubscribe(&mut self, event: &str, id: Option<HandlerId>) -> usize {
        let removed = match (self.listeners.get_mut(event), id) {
            (None, _) => 0,
            (Some(handlers), Some(id)) => usize::from(handlers.remove(&id).is_some()),
            (Some(handlers), None) => {
                let n = handlers.len();
                handlers.clear();
                n
            }
        };
        if self.listeners.get(event).is_some_and(HashMap::is_empty) {
            self.listeners.remove(event);
        }
        removed
    }

    /// Invokes every handler registered for the event. A panicking handler
    /// is logged and skipped. Returns the number of handlers that completed.
    pub fn dispatch(&self, event: &Event) -> usize {
        let Some(handlers) = self.listeners.get(event.name()) else {
            trace!(event = event.name(), "no listeners");
            return 0;
        };

        let mut completed = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    warn!(event = event.name(), handler = id.0, panic = %msg, "event handler panicked");
                }
            }
        }
        completed
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, HashMap::len)
    }
}

/// Wraps a typed callback into a [`Handler`] that decodes the event data
/// first. Events whose data does not decode are logged and skipped.
pub fn payload_handler<P, F>(f: F) -> Handler
where
    P: DeserializeOwned,
    F: Fn(P) + Send + Sync + 'static,
{
    Arc::new(move |event: &Event| match serde_json::from_value::<P>(event.data()) {
        Ok(payload) => f(payload),
        Err(e) => warn!(event = event.name(), error = %e, "failed to decode event payload"),
    })
}
