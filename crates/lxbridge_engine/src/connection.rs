//! Connection lifecycle.
//!
//! The supervisor owns the connect sequence (open session, load structure,
//! rebuild bindings, enable push updates), the connectivity flag, and fixed-delay
//! reconnect scheduling.
//!
//! ## Key Invariants
//!
//! - At most one connect attempt is in flight; overlapping calls are rejected
//! - The connectivity flag is true only after the whole sequence succeeded
//! - At most one reconnect timer is armed; scheduling never stacks timers
//! - A deliberate local close never triggers a reconnect
//! - A close of the current session during a connect attempt fails that attempt

use crate::config::BridgeConfig;
use crate::counters::CounterReporter;
use crate::error::{BridgeError, BridgeResult};
use crate::queue::EventQueue;
use crate::store::{ObjectCommon, StateStore};
use crate::timer::TimerSlot;
use crate::transport::{ControllerTransport, EventSink, SessionClosed};
use async_trait::async_trait;
use lxbridge_protocol::{CloseReason, ItemId, StateValue, StructureFile, ValueType};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Item the connectivity flag is published to.
pub const CONNECTION_ITEM: &str = "info.connection";

/// The current phase of the controller connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Not connected and not connecting.
    Idle,
    /// Opening the transport session.
    Connecting,
    /// Loading the structure and rebuilding bindings.
    Synchronizing,
    /// Connected with push updates enabled.
    Connected,
}

impl ConnectionPhase {
    /// Returns true while a connect attempt is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionPhase::Connecting | ConnectionPhase::Synchronizing)
    }

    /// Returns true if a new connect attempt may start.
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionPhase::Idle)
    }
}

/// Statistics about the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of successful connects.
    pub connects: u64,
    /// Number of failed connect attempts.
    pub failed_attempts: u64,
    /// Number of reconnects scheduled.
    pub reconnects_scheduled: u64,
    /// Last error message.
    pub last_error: Option<String>,
    /// Time of the last successful connect.
    pub last_connected: Option<Instant>,
}

/// Result of a connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The sequence completed.
    Connected,
    /// Another attempt is in flight; nothing was done.
    AlreadyInProgress,
    /// Already connected; nothing was done.
    AlreadyConnected,
    /// A step failed; a reconnect was scheduled.
    Failed(String),
    /// The bridge is shutting down.
    ShuttingDown,
}

/// The connectivity flag: whether local writes may be forwarded to the controller.
///
/// Only the [`ConnectionSupervisor`] changes it.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
}

impl ConnectionState {
    /// Creates a disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if the controller connection is usable.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sets the flag. Returns true if it changed.
    pub(crate) fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst) != connected
    }
}

/// Rebuilds bindings from a freshly loaded structure description.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Replaces all bindings with those derived from `structure`.
    async fn synchronize(&self, structure: &StructureFile) -> BridgeResult<()>;
}

/// Supervises the controller connection.
pub struct ConnectionSupervisor {
    config: BridgeConfig,
    transport: Arc<dyn ControllerTransport>,
    store: Arc<dyn StateStore>,
    state: Arc<ConnectionState>,
    queue: Arc<EventQueue>,
    counters: Arc<CounterReporter>,
    synchronizer: Arc<dyn Synchronizer>,
    wake: Arc<Notify>,
    closed: mpsc::UnboundedSender<SessionClosed>,
    phase: RwLock<ConnectionPhase>,
    interrupted: Mutex<Option<CloseReason>>,
    stats: RwLock<ConnectionStats>,
    reconnect: Mutex<TimerSlot>,
    session: AtomicU64,
    stopping: AtomicBool,
}

impl ConnectionSupervisor {
    /// Creates an idle supervisor.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: BridgeConfig,
        transport: Arc<dyn ControllerTransport>,
        store: Arc<dyn StateStore>,
        state: Arc<ConnectionState>,
        queue: Arc<EventQueue>,
        counters: Arc<CounterReporter>,
        synchronizer: Arc<dyn Synchronizer>,
        wake: Arc<Notify>,
        closed: mpsc::UnboundedSender<SessionClosed>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            state,
            queue,
            counters,
            synchronizer,
            wake,
            closed,
            phase: RwLock::new(ConnectionPhase::Idle),
            interrupted: Mutex::new(None),
            stats: RwLock::new(ConnectionStats::default()),
            reconnect: Mutex::new(TimerSlot::new()),
            session: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
        }
    }

    /// Gets the current phase.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Checks if the controller connection is usable.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Returns true while a reconnect timer is armed.
    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect.lock().is_armed()
    }

    /// Returns the id of the latest transport session.
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    /// Declares the connectivity item and publishes the current flag.
    pub async fn initialize(&self) {
        let id = ItemId::new(CONNECTION_ITEM);
        let common = ObjectCommon::new("Connected to controller", "indicator.connected", ValueType::Boolean);
        if let Err(e) = self.store.set_object(&id, common).await {
            warn!(error = %e, "failed to declare connection item");
        }
        self.publish_connected(self.state.is_connected()).await;
    }

    /// Runs the connect sequence.
    pub async fn connect(self: &Arc<Self>) -> ConnectOutcome {
        {
            let mut phase = self.phase.write();
            if self.stopping.load(Ordering::SeqCst) {
                return ConnectOutcome::ShuttingDown;
            }
            if phase.is_active() {
                warn!(phase = ?*phase, "connect already in progress");
                return ConnectOutcome::AlreadyInProgress;
            }
            if !phase.can_connect() {
                debug!("already connected");
                return ConnectOutcome::AlreadyConnected;
            }
            *phase = ConnectionPhase::Connecting;
            *self.interrupted.lock() = None;
        }
        self.reconnect.lock().cancel();

        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = EventSink::new(
            session,
            Arc::clone(&self.queue),
            Arc::clone(&self.counters),
            Arc::clone(&self.wake),
            self.closed.clone(),
        );
        info!(endpoint = %self.config.endpoint, session, "connecting to controller");

        let result = match self
            .transport
            .open(&self.config.endpoint, &self.config.credentials, sink)
            .await
        {
            Ok(()) => {
                self.set_phase(ConnectionPhase::Synchronizing);
                self.synchronize().await.map_err(|e| (e, true))
            }
            Err(e) => Err((e, false)),
        };
        let result = result.and_then(|()| match self.finish_connect() {
            None => Ok(()),
            Some(reason) => Err((
                BridgeError::transport_retryable(format!("session closed during connect: {reason}")),
                true,
            )),
        });

        match result {
            Ok(()) if self.stopping.load(Ordering::SeqCst) => {
                self.close_transport().await;
                self.set_phase(ConnectionPhase::Idle);
                ConnectOutcome::ShuttingDown
            }
            Ok(()) => {
                {
                    let mut stats = self.stats.write();
                    stats.connects += 1;
                    stats.last_error = None;
                    stats.last_connected = Some(Instant::now());
                }
                self.set_connected(true).await;
                self.queue.set_running(true);
                self.wake.notify_one();
                info!(session, "connected to controller");
                ConnectOutcome::Connected
            }
            Err((e, opened)) => {
                warn!(error = %e, retryable = e.is_retryable(), "connect attempt failed");
                if opened {
                    self.close_transport().await;
                }
                self.set_phase(ConnectionPhase::Idle);
                {
                    let mut stats = self.stats.write();
                    stats.failed_attempts += 1;
                    stats.last_error = Some(e.to_string());
                }
                self.schedule_reconnect();
                ConnectOutcome::Failed(e.to_string())
            }
        }
    }

    /// Schedules a single reconnect after the configured delay.
    ///
    /// Returns false without scheduling if a timer is already armed, a connect
    /// attempt is in flight, or the bridge is shutting down.
    pub fn schedule_reconnect(self: &Arc<Self>) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        if self.phase().is_active() {
            debug!("connect in flight, reconnect not scheduled");
            return false;
        }

        let mut slot = self.reconnect.lock();
        if slot.is_armed() {
            debug!("reconnect already scheduled");
            return false;
        }
        let delay = self.config.reconnect.delay;
        let supervisor = Arc::downgrade(self);
        slot.arm(delay, move |generation| async move {
            if let Some(supervisor) = supervisor.upgrade() {
                supervisor.on_reconnect_timer(generation).await;
            }
        });
        drop(slot);

        self.stats.write().reconnects_scheduled += 1;
        info!(?delay, "reconnect scheduled");
        true
    }

    /// Handles the end of a transport session.
    ///
    /// A close during a connect attempt is recorded and fails that attempt when it
    /// completes; the attempt then schedules the reconnect.
    pub async fn handle_closed(self: &Arc<Self>, session: u64, reason: CloseReason) {
        if session != self.session() {
            debug!(session, %reason, "ignoring close of a previous session");
            return;
        }
        {
            let mut phase = self.phase.write();
            if phase.is_active() {
                debug!(session, %reason, "session closed during connect");
                *self.interrupted.lock() = Some(reason);
                return;
            }
            *phase = ConnectionPhase::Idle;
        }

        self.set_connected(false).await;
        self.queue.set_running(false);

        if reason.is_manual() || self.stopping.load(Ordering::SeqCst) {
            info!(session, %reason, "controller connection closed");
        } else {
            warn!(session, %reason, "controller connection lost");
            self.schedule_reconnect();
        }
    }

    /// Stops the supervisor for good: cancels the reconnect timer, stops the queue
    /// and closes the session.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.reconnect.lock().cancel();
        self.queue.set_running(false);
        self.close_transport().await;
        self.set_phase(ConnectionPhase::Idle);
        self.state.set_connected(false);
        self.publish_connected(false).await;
        debug!("connection supervisor stopped");
    }

    /// Returns true once shutdown has started.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    async fn synchronize(&self) -> BridgeResult<()> {
        let body = self.transport.send(&self.config.structure_path).await?;
        let structure = StructureFile::from_slice(body.as_bytes())?;
        debug!(controls = structure.control_count(), "structure loaded");

        self.synchronizer.synchronize(&structure).await?;
        self.transport.send(&self.config.enable_updates_path).await?;
        Ok(())
    }

    /// Moves to `Connected` unless the session was closed while connecting.
    ///
    /// Checked under the phase lock so a concurrent close is either recorded
    /// before this point or sees the `Connected` phase.
    fn finish_connect(&self) -> Option<CloseReason> {
        let mut phase = self.phase.write();
        let interrupted = self.interrupted.lock().take();
        if interrupted.is_none() {
            *phase = ConnectionPhase::Connected;
        }
        interrupted
    }

    async fn on_reconnect_timer(self: Arc<Self>, generation: u64) {
        if !self.reconnect.lock().take_fired(generation) {
            return;
        }
        info!("reconnecting to controller");
        self.connect().await;
    }

    async fn close_transport(&self) {
        if !self.transport.is_open() {
            return;
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "failed to close transport");
        }
    }

    /// Sets the connectivity flag and publishes it if it changed.
    async fn set_connected(&self, connected: bool) {
        if self.state.set_connected(connected) {
            self.publish_connected(connected).await;
        }
    }

    async fn publish_connected(&self, connected: bool) {
        let id = ItemId::new(CONNECTION_ITEM);
        if let Err(e) = self
            .store
            .set_state(&id, StateValue::Bool(connected), true)
            .await
        {
            warn!(error = %e, "failed to publish connection state");
        }
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        *self.phase.write() = phase;
    }
}
