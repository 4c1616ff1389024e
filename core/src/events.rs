use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use crate::types::ContainerSnapshot;

/// Everything the monitor can tell the outside world, one variant per kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    ContainerStarted {
        host_id: i64,
        container: ContainerSnapshot,
    },
    ContainerStopped {
        host_id: i64,
        /// Last snapshot seen before the container disappeared; it is no
        /// longer fetchable from the engine.
        container: ContainerSnapshot,
    },
    HealthChanged {
        host_id: i64,
        healthy: bool,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        host_id: Option<i64>,
    },
    Info {
        message: String,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ContainerStarted { .. } => EventKind::ContainerStarted,
            Self::ContainerStopped { .. } => EventKind::ContainerStopped,
            Self::HealthChanged { .. } => EventKind::HealthChanged,
            Self::Error { .. } => EventKind::Error,
            Self::Info { .. } => EventKind::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ContainerStarted,
    ContainerStopped,
    HealthChanged,
    Error,
    Info,
}

/// Opaque registration handle; pass back to [`EventBus::off`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

/// Synchronous typed publish/subscribe hub.
///
/// Delivery happens in registration order within the emitting call. A handler
/// that panics is isolated: the panic is caught, logged, surfaced as a
/// follow-up `Error` event, and the remaining handlers still run.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    handlers: Mutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler for one event kind.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&MonitorEvent) + Send + Sync + 'static) -> HandlerId {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Register a handler for every event kind.
    pub fn on_any(&self, handler: impl Fn(&MonitorEvent) + Send + Sync + 'static) -> HandlerId {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, kind: Option<EventKind>, handler: Handler) -> HandlerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .expect("event bus lock poisoned")
            .push(HandlerEntry { id, kind, handler });
        HandlerId(id)
    }

    /// Unregister a handler. Unknown handles are a no-op, so `off` is safe to
    /// call twice.
    pub fn off(&self, handle: HandlerId) {
        self.inner
            .handlers
            .lock()
            .expect("event bus lock poisoned")
            .retain(|entry| entry.id != handle.0);
    }

    /// Deliver `event` to every matching handler, in registration order.
    pub fn emit(&self, event: &MonitorEvent) {
        debug!(kind = ?event.kind(), "emitting event");
        // Snapshot the matching handlers so a handler may call back into the
        // bus (emit, on, off) without deadlocking.
        let matching: Vec<Handler> = {
            let handlers = self.inner.handlers.lock().expect("event bus lock poisoned");
            handlers
                .iter()
                .filter(|entry| entry.kind.is_none() || entry.kind == Some(event.kind()))
                .map(|entry| entry.handler.clone())
                .collect()
        };

        for handler in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(kind = ?event.kind(), "event handler panicked");
                // Surface the failure, but never recurse off a failing
                // error-handler.
                if event.kind() != EventKind::Error {
                    self.emit(&MonitorEvent::Error {
                        message: "event handler panicked".to_string(),
                        host_id: None,
                    });
                }
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().expect("event bus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
