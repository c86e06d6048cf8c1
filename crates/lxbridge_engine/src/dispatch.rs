//! Event dispatch.
//!
//! Resolves a controller UUID to its registered handlers and invokes them in
//! registration order. Each handler runs as its own task and is awaited before the
//! next one starts, so a failing or panicking handler is isolated from its siblings
//! and from the drain loop without giving up ordering.

use crate::counters::{CounterId, CounterReporter};
use crate::error::BridgeResult;
use async_trait::async_trait;
use lxbridge_protocol::{ControllerEvent, ControllerUuid};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles inbound events for one controller UUID.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: ControllerEvent) -> BridgeResult<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(ControllerEvent) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<()>> + Send,
{
    async fn handle(&self, event: ControllerEvent) -> BridgeResult<()> {
        (self)(event).await
    }
}

struct Registration {
    name: Option<String>,
    handler: Arc<dyn EventHandler>,
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler is registered for the UUID.
    Unknown,
    /// Handlers ran; `failed` of them returned an error or panicked.
    Handled {
        /// Number of handlers invoked.
        handlers: usize,
        /// Number of handlers that failed.
        failed: usize,
    },
}

/// Routes events to registered handlers.
pub struct EventDispatcher {
    handlers: RwLock<HashMap<ControllerUuid, Vec<Registration>>>,
    reported_unknown: Mutex<HashSet<ControllerUuid>>,
    counters: Arc<CounterReporter>,
}

impl EventDispatcher {
    /// Creates a dispatcher without registrations.
    pub fn new(counters: Arc<CounterReporter>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            reported_unknown: Mutex::new(HashSet::new()),
            counters,
        }
    }

    /// Registers a handler for a UUID.
    ///
    /// A named registration replaces an earlier one with the same name in place;
    /// unnamed registrations always append.
    pub fn register(&self, uuid: ControllerUuid, handler: Arc<dyn EventHandler>, name: Option<&str>) {
        let mut handlers = self.handlers.write();
        let registrations = handlers.entry(uuid).or_default();

        if let Some(name) = name {
            if let Some(existing) = registrations
                .iter_mut()
                .find(|r| r.name.as_deref() == Some(name))
            {
                existing.handler = handler;
                return;
            }
        }
        registrations.push(Registration {
            name: name.map(str::to_string),
            handler,
        });
    }

    /// Removes the named registration for a UUID. Returns true if one was removed.
    pub fn unregister(&self, uuid: &ControllerUuid, name: &str) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registrations) = handlers.get_mut(uuid) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.name.as_deref() != Some(name));
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            handlers.remove(uuid);
        }
        removed
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of handlers registered for a UUID.
    pub fn handler_count(&self, uuid: &ControllerUuid) -> usize {
        self.handlers.read().get(uuid).map_or(0, Vec::len)
    }

    /// Returns the number of UUIDs with at least one handler.
    pub fn subject_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Invokes every handler registered for the event's UUID, in order.
    pub async fn dispatch(&self, event: ControllerEvent) -> DispatchOutcome {
        let handlers: Vec<(Option<String>, Arc<dyn EventHandler>)> = self
            .handlers
            .read()
            .get(&event.uuid)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (r.name.clone(), Arc::clone(&r.handler)))
                    .collect()
            })
            .unwrap_or_default();

        if handlers.is_empty() {
            self.report_unknown(&event);
            return DispatchOutcome::Unknown;
        }

        let mut failed = 0;
        for (name, handler) in &handlers {
            let handler = Arc::clone(handler);
            let task_event = event.clone();
            let result = tokio::spawn(async move { handler.handle(task_event).await }).await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(uuid = %event.uuid, handler = ?name, error = %e, "event handler failed");
                }
                Err(join_error) if join_error.is_panic() => {
                    failed += 1;
                    error!(uuid = %event.uuid, handler = ?name, "event handler panicked");
                }
                Err(_) => {
                    failed += 1;
                    warn!(uuid = %event.uuid, handler = ?name, "event handler cancelled");
                }
            }
        }

        debug!(uuid = %event.uuid, handlers = handlers.len(), failed, "event dispatched");
        DispatchOutcome::Handled {
            handlers: handlers.len(),
            failed,
        }
    }

    fn report_unknown(&self, event: &ControllerEvent) {
        if self.reported_unknown.lock().insert(event.uuid.clone()) {
            info!(uuid = %event.uuid, value = %event.value, "event for unknown uuid");
        }
        self.counters.increment_detail(
            CounterId::UnknownEvents,
            event.uuid.as_str(),
            Some(event.value.clone()),
        );
    }
}
