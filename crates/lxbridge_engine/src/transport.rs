//! Transport abstraction for the controller connection.

use crate::config::{Credentials, Endpoint};
use crate::counters::{CounterId, CounterReporter};
use crate::error::{BridgeError, BridgeResult};
use crate::queue::EventQueue;
use async_trait::async_trait;
use lxbridge_protocol::{CloseReason, ControllerEvent, STRUCTURE_PATH};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// A controller transport handles the session with the controller.
///
/// This trait abstracts framing, authentication and encryption, allowing for
/// different implementations (websocket, mock for testing, etc.). Inbound events
/// and the end of the session are reported through the [`EventSink`] handed to
/// `open`.
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    /// Opens an authenticated session.
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        sink: EventSink,
    ) -> BridgeResult<()>;

    /// Sends a request path and returns the response body.
    async fn send(&self, path: &str) -> BridgeResult<String>;

    /// Closes the session. The sink receives [`CloseReason::Manual`].
    async fn close(&self) -> BridgeResult<()>;

    /// Checks if a session is open.
    fn is_open(&self) -> bool;
}

/// End of a transport session, tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionClosed {
    pub(crate) session: u64,
    pub(crate) reason: CloseReason,
}

/// Receiving end of one transport session.
///
/// Delivered events go straight into the event queue; handling happens later on
/// the bridge's event loop.
#[derive(Clone)]
pub struct EventSink {
    session: u64,
    queue: Arc<EventQueue>,
    counters: Arc<CounterReporter>,
    wake: Arc<Notify>,
    closed: mpsc::UnboundedSender<SessionClosed>,
}

impl EventSink {
    pub(crate) fn new(
        session: u64,
        queue: Arc<EventQueue>,
        counters: Arc<CounterReporter>,
        wake: Arc<Notify>,
        closed: mpsc::UnboundedSender<SessionClosed>,
    ) -> Self {
        Self {
            session,
            queue,
            counters,
            wake,
            closed,
        }
    }

    /// Returns the session this sink belongs to.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Delivers an inbound event.
    pub fn deliver(&self, event: ControllerEvent) {
        self.queue.enqueue(event);
        self.counters.increment(CounterId::EventsReceived);
        self.wake.notify_one();
    }

    /// Reports the end of the session.
    pub fn closed(&self, reason: CloseReason) {
        let closed = SessionClosed {
            session: self.session,
            reason,
        };
        if self.closed.send(closed).is_err() {
            debug!(session = self.session, "close reported after bridge shut down");
        }
    }
}

const OK_RESPONSE: &str = r#"{"LL":{"Code":"200","value":"1"}}"#;

/// A mock transport for testing.
///
/// Responses are scripted per request path; paths without a script answer with a
/// generic success body. Failures can be injected for `open` and individual paths.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, String>>,
    failing_paths: Mutex<HashSet<String>>,
    failing_opens: AtomicUsize,
    opens: AtomicUsize,
    sent: Mutex<Vec<String>>,
    sink: Mutex<Option<EventSink>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock transport that serves the given structure description.
    pub fn with_structure(structure: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.set_response(STRUCTURE_PATH, structure);
        transport
    }

    /// Sets the response body for a request path.
    pub fn set_response(&self, path: &str, body: impl Into<String>) {
        self.responses.lock().insert(path.to_string(), body.into());
    }

    /// Makes the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Makes every request to `path` fail until cleared.
    pub fn fail_path(&self, path: &str) {
        self.failing_paths.lock().insert(path.to_string());
    }

    /// Removes all injected path failures.
    pub fn clear_failures(&self) {
        self.failing_paths.lock().clear();
        self.failing_opens.store(0, Ordering::SeqCst);
    }

    /// Returns every path sent, in order.
    pub fn sent_paths(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Returns the number of `open` calls, including failed ones.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Pushes an event into the open session. Returns false if no session is open.
    pub fn push_event(&self, event: ControllerEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Ends the open session as if the controller dropped it.
    pub fn drop_connection(&self, reason: CloseReason) -> bool {
        match self.sink.lock().take() {
            Some(sink) => {
                sink.closed(reason);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ControllerTransport for MockTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        _credentials: &Credentials,
        sink: EventSink,
    ) -> BridgeResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(BridgeError::transport_retryable(format!(
                "connection to {endpoint} refused"
            )));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn send(&self, path: &str) -> BridgeResult<String> {
        if !self.is_open() {
            return Err(BridgeError::NotConnected);
        }
        self.sent.lock().push(path.to_string());
        if self.failing_paths.lock().contains(path) {
            return Err(BridgeError::transport_retryable(format!("request {path} failed")));
        }
        Ok(self
            .responses
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| OK_RESPONSE.to_string()))
    }

    async fn close(&self) -> BridgeResult<()> {
        self.drop_connection(CloseReason::Manual);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.sink.lock().is_some()
    }
}
