use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::trace;

use super::RealtimeError;

/// A named push event. The payload has no required schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub name: String,
    pub payload: Value,
}

pub type EventHandler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Push channel the bridge listens on (a socket client, or `LocalTransport`).
///
/// Handlers may be invoked from any thread and must not block.
pub trait RealtimeTransport: Send + Sync {
    fn subscribe(&self, event: &str, handler: EventHandler) -> Result<HandlerId, RealtimeError>;

    fn unsubscribe(&self, event: &str, id: HandlerId) -> Result<(), RealtimeError>;
}

/// In-process transport: `emit` delivers synchronously to every handler
/// registered for the event.
#[derive(Default)]
pub struct LocalTransport {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event. Returns the number of handlers that received it.
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        // Handlers run outside the lock so they may (un)subscribe.
        let handlers: Vec<EventHandler> = match self.handlers.lock() {
            Ok(map) => map
                .get(name)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => return 0,
        };

        let event = RealtimeEvent {
            name: name.to_string(),
            payload,
        };
        for handler in &handlers {
            handler(&event);
        }
        trace!(event = name, delivered = handlers.len(), "Emitted realtime event");
        handlers.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .map(|map| map.get(event).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Refuse further subscriptions and drop every handler.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut map) = self.handlers.lock() {
            map.clear();
        }
    }
}

impl RealtimeTransport for LocalTransport {
    fn subscribe(&self, event: &str, handler: EventHandler) -> Result<HandlerId, RealtimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::Closed);
        }
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut map = self.handlers.lock().map_err(|_| RealtimeError::Subscribe {
            event: event.to_string(),
            reason: "handler table poisoned".to_string(),
        })?;
        map.entry(event.to_string()).or_default().push((id, handler));
        Ok(id)
    }

    fn unsubscribe(&self, event: &str, id: HandlerId) -> Result<(), RealtimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::Closed);
        }
        let unknown = || RealtimeError::UnknownHandler {
            event: event.to_string(),
            id: id.0,
        };
        let mut map = self.handlers.lock().map_err(|_| unknown())?;
        let list = map.get_mut(event).ok_or_else(unknown)?;
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        if list.len() == before {
            return Err(unknown());
        }
        if list.is_empty() {
            map.remove(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_only_matching_handlers() {
        let transport = LocalTransport::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = transport
            .subscribe(
                "courses:update",
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert_eq!(transport.emit("courses:update", Value::Null), 1);
        assert_eq!(transport.emit("products:update", Value::Null), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        transport.unsubscribe("courses:update", id).unwrap();
        assert_eq!(transport.handler_count("courses:update"), 0);
        assert!(matches!(
            transport.unsubscribe("courses:update", id),
            Err(RealtimeError::UnknownHandler { .. })
        ));
    }

    #[test]
    fn test_closed_transport_rejects_subscribe() {
        let transport = LocalTransport::new();
        transport.close();
        let err = transport
            .subscribe("courses:update", Arc::new(|_| {}))
            .unwrap_err();
        assert_eq!(err, RealtimeError::Closed);
    }
}
