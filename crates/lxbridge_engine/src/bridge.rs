//! The bridge facade.
//!
//! Wires the queue, dispatcher, acknowledgement tracker, counters and connection
//! supervisor together and runs the event loop that drains inbound events.

use crate::ack::{AckTracker, WriteListener, WriteOptions, WriteOutcome};
use crate::command::{CommandChannel, CommandListener};
use crate::config::BridgeConfig;
use crate::connection::{ConnectOutcome, ConnectionState, ConnectionSupervisor, Synchronizer};
use crate::counters::CounterReporter;
use crate::dispatch::{EventDispatcher, EventHandler};
use crate::error::BridgeResult;
use crate::loader::{LoadSummary, LoaderRegistry};
use crate::queue::EventQueue;
use crate::store::{ObjectCommon, StateStore};
use crate::transport::{ControllerTransport, SessionClosed};
use async_trait::async_trait;
use lxbridge_protocol::{ControllerEvent, ControllerUuid, ItemId, StateValue, StructureFile, ValueType};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

/// Registration surface handed to control loaders.
#[derive(Clone)]
pub struct BridgeContext {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<EventDispatcher>,
    acks: Arc<AckTracker>,
    commands: Arc<CommandChannel>,
}

impl BridgeContext {
    /// Declares an item that follows the events of `uuid`.
    ///
    /// Every event for `uuid` is coerced to the item's type, acknowledged and
    /// treated as the confirmation of a pending write. With a `listener` the item
    /// also accepts host writes, governed by `options`.
    pub async fn register_writable_item(
        &self,
        id: ItemId,
        common: ObjectCommon,
        uuid: ControllerUuid,
        listener: Option<Arc<dyn WriteListener>>,
        options: WriteOptions,
    ) -> BridgeResult<()> {
        let value_type = common.value_type;
        self.store.set_object(&id, common).await?;

        if let Some(listener) = listener {
            self.acks.register(id.clone(), listener, options);
        }

        let handler = Arc::new(StateUpdateHandler {
            id: id.clone(),
            value_type,
            acks: Arc::clone(&self.acks),
        });
        self.dispatcher.register(uuid, handler, Some(id.as_str()));
        Ok(())
    }

    /// Declares an object without binding it to events.
    pub async fn declare_object(&self, id: &ItemId, common: ObjectCommon) -> BridgeResult<()> {
        self.store.set_object(id, common).await
    }

    /// Registers an event handler for a controller subject.
    pub fn register_event_handler(
        &self,
        uuid: ControllerUuid,
        handler: Arc<dyn EventHandler>,
        name: Option<&str>,
    ) {
        self.dispatcher.register(uuid, handler, name);
    }

    /// Removes a named event handler. Returns true if one was removed.
    pub fn unregister_event_handler(&self, uuid: &ControllerUuid, name: &str) -> bool {
        self.dispatcher.unregister(uuid, name)
    }

    /// Sends a command to the controller.
    pub async fn send_command(&self, uuid: &ControllerUuid, action: &str) -> BridgeResult<String> {
        self.commands.send_command(uuid, action).await
    }

    /// Returns a write listener that sends written values as commands to `uuid`.
    pub fn command_listener(&self, uuid: ControllerUuid) -> Arc<dyn WriteListener> {
        Arc::new(CommandListener::new(Arc::clone(&self.commands), uuid))
    }

    /// Writes a confirmed value to the host store.
    pub async fn acknowledge_value(&self, id: &ItemId, value: StateValue) -> BridgeResult<()> {
        self.acks.acknowledge(id, value).await
    }

    /// Returns the last acknowledged value of an item.
    pub fn read_cached_value(&self, id: &str) -> Option<StateValue> {
        self.acks.cached_value(id)
    }
}

/// Applies events of one subject to one item.
struct StateUpdateHandler {
    id: ItemId,
    value_type: ValueType,
    acks: Arc<AckTracker>,
}

#[async_trait]
impl EventHandler for StateUpdateHandler {
    async fn handle(&self, event: ControllerEvent) -> BridgeResult<()> {
        let value = event.value.coerce_to(self.value_type);
        self.acks.acknowledge(&self.id, value).await?;
        self.acks.on_confirmation(&self.id).await;
        Ok(())
    }
}

/// Rebuilds all bindings from the structure description.
struct BindingSynchronizer {
    context: BridgeContext,
    loaders: LoaderRegistry,
    last_summary: RwLock<Option<LoadSummary>>,
}

#[async_trait]
impl Synchronizer for BindingSynchronizer {
    async fn synchronize(&self, structure: &StructureFile) -> BridgeResult<()> {
        self.context.dispatcher.clear();
        self.context.acks.clear();

        let summary = self.loaders.load_structure(&self.context, structure).await;
        info!(
            controls = summary.total_loaded(),
            failed = summary.failed,
            handlers = self.context.dispatcher.subject_count(),
            "bindings rebuilt"
        );
        *self.last_summary.write() = Some(summary);
        Ok(())
    }
}

/// A bridge between one controller and the host store.
pub struct Bridge {
    config: BridgeConfig,
    counters: Arc<CounterReporter>,
    queue: Arc<EventQueue>,
    dispatcher: Arc<EventDispatcher>,
    acks: Arc<AckTracker>,
    supervisor: Arc<ConnectionSupervisor>,
    synchronizer: Arc<BindingSynchronizer>,
    wake: Arc<Notify>,
    closed: tokio::sync::Mutex<mpsc::UnboundedReceiver<SessionClosed>>,
    stop: Notify,
    stopped: AtomicBool,
}

impl Bridge {
    /// Creates a bridge. Nothing is connected until [`Bridge::start`].
    pub fn new(
        config: BridgeConfig,
        transport: Arc<dyn ControllerTransport>,
        store: Arc<dyn StateStore>,
        loaders: LoaderRegistry,
    ) -> BridgeResult<Arc<Self>> {
        config.validate()?;

        let counters = Arc::new(CounterReporter::new(
            Arc::clone(&store),
            config.counter_flush_interval,
        ));
        let connection = Arc::new(ConnectionState::new());
        let queue = Arc::new(EventQueue::new());
        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&counters)));
        let acks = Arc::new(AckTracker::new(
            Arc::clone(&store),
            Arc::clone(&connection),
            Arc::clone(&counters),
            config.ack_timeout,
        ));
        let commands = Arc::new(CommandChannel::new(
            Arc::clone(&transport),
            Arc::clone(&counters),
            Arc::clone(&connection),
        ));

        let context = BridgeContext {
            store: Arc::clone(&store),
            dispatcher: Arc::clone(&dispatcher),
            acks: Arc::clone(&acks),
            commands,
        };
        let synchronizer = Arc::new(BindingSynchronizer {
            context,
            loaders,
            last_summary: RwLock::new(None),
        });

        let wake = Arc::new(Notify::new());
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(ConnectionSupervisor::new(
            config.clone(),
            transport,
            store,
            connection,
            Arc::clone(&queue),
            Arc::clone(&counters),
            Arc::clone(&synchronizer) as Arc<dyn Synchronizer>,
            Arc::clone(&wake),
            closed_tx,
        ));

        Ok(Arc::new(Self {
            config,
            counters,
            queue,
            dispatcher,
            acks,
            supervisor,
            synchronizer,
            wake,
            closed: tokio::sync::Mutex::new(closed_rx),
            stop: Notify::new(),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Publishes the initial engine items and runs the first connect attempt.
    ///
    /// A failed attempt is retried in the background.
    pub async fn start(&self) -> ConnectOutcome {
        self.counters.initialize().await;
        self.supervisor.initialize().await;
        self.supervisor.connect().await
    }

    /// Runs the event loop until [`Bridge::shutdown`] is called.
    ///
    /// Drains the event queue whenever the transport delivered events and hands
    /// session ends to the supervisor.
    pub async fn run(&self) {
        let mut closed = self.closed.lock().await;
        while !self.stopped.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.stop.notified() => break,
                Some(SessionClosed { session, reason }) = closed.recv() => {
                    self.supervisor.handle_closed(session, reason).await;
                }
                _ = self.wake.notified() => {
                    self.process_events().await;
                }
            }
        }
        debug!("event loop stopped");
    }

    /// Drains the event queue once. Returns the number of events handled.
    pub async fn process_events(&self) -> usize {
        self.queue
            .drain(|event| {
                let dispatcher = Arc::clone(&self.dispatcher);
                async move {
                    dispatcher.dispatch(event).await;
                }
            })
            .await
    }

    /// Handles a state change reported by the host.
    ///
    /// Acknowledged changes are the engine's own writes and are ignored; anything
    /// else is a write request. Returns `None` for ignored changes.
    pub async fn handle_state_change(
        &self,
        id: &ItemId,
        value: StateValue,
        ack: bool,
    ) -> Option<WriteOutcome> {
        if ack {
            return None;
        }
        Some(self.acks.dispatch(id, value).await)
    }

    /// Stops the bridge: no reconnect, no pending acknowledgements, transport
    /// closed, counters flushed, bindings cleared.
    pub async fn shutdown(&self) {
        info!("shutting down bridge");
        let cancelled = self.acks.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "pending acknowledgements cancelled");
        }
        self.supervisor.shutdown().await;
        self.counters.shutdown().await;
        self.dispatcher.clear();
        self.acks.clear();

        self.stopped.store(true, Ordering::SeqCst);
        self.stop.notify_one();
    }

    /// Returns the registration surface used by control loaders.
    pub fn context(&self) -> &BridgeContext {
        &self.synchronizer.context
    }

    /// Returns the summary of the latest structure load.
    pub fn last_load_summary(&self) -> Option<LoadSummary> {
        self.synchronizer.last_summary.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns the connection supervisor.
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Returns the counters.
    pub fn counters(&self) -> &Arc<CounterReporter> {
        &self.counters
    }

    /// Returns the acknowledgement tracker.
    pub fn acks(&self) -> &Arc<AckTracker> {
        &self.acks
    }

    /// Returns the event dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Returns the event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Checks if the controller connection is usable.
    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::counters::CounterId;
    use crate::store::MemoryStateStore;
    use crate::transport::MockTransport;
    use std::time::Duration;

    const STRUCTURE: &str = r#"{
        "controls": {
            "ctl-1": {
                "name": "Temperature",
                "type": "InfoOnlyAnalog",
                "uuidAction": "ctl-1",
                "states": {"value": "st-1"}
            }
        }
    }"#;

    fn bridge() -> (Arc<Bridge>, Arc<MockTransport>, Arc<MemoryStateStore>) {
        let transport = Arc::new(MockTransport::with_structure(STRUCTURE));
        let store = Arc::new(MemoryStateStore::new());
        let bridge = Bridge::new(
            BridgeConfig::new("miniserver", 80, Credentials::new("admin", "secret")),
            Arc::clone(&transport) as Arc<dyn ControllerTransport>,
            Arc::clone(&store) as Arc<dyn StateStore>,
            LoaderRegistry::new(),
        )
        .unwrap();
        (bridge, transport, store)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = Bridge::new(
            BridgeConfig::default(),
            Arc::new(MockTransport::new()),
            Arc::new(MemoryStateStore::new()),
            LoaderRegistry::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn start_loads_generic_states() {
        let (bridge, _transport, store) = bridge();

        assert_eq!(bridge.start().await, ConnectOutcome::Connected);
        assert!(store.object("ctl-1.value").is_some());
        assert_eq!(bridge.dispatcher().handler_count(&ControllerUuid::from("st-1")), 1);
        assert_eq!(bridge.last_load_summary().unwrap().fallback, 1);
    }

    #[tokio::test]
    async fn events_flow_into_store() {
        let (bridge, transport, store) = bridge();
        bridge.start().await;

        transport.push_event(ControllerEvent::value("st-1", 21.5));
        assert_eq!(bridge.process_events().await, 1);

        assert_eq!(store.value("ctl-1.value"), Some(StateValue::Number(21.5)));
        assert!(store.state("ctl-1.value").unwrap().ack);
        assert_eq!(
            bridge.context().read_cached_value("ctl-1.value"),
            Some(StateValue::Number(21.5))
        );
        assert_eq!(bridge.counters().value(CounterId::EventsReceived), 1);
    }

    #[tokio::test]
    async fn context_surface_for_loaders() {
        let (bridge, _transport, store) = bridge();
        bridge.start().await;
        let ctx = bridge.context();

        let id = ItemId::from("ctl-1.text");
        ctx.declare_object(&id, ObjectCommon::new("Temperature", "text", ValueType::String))
            .await
            .unwrap();
        ctx.acknowledge_value(&id, StateValue::Text("21.5 °C".into()))
            .await
            .unwrap();
        assert!(store.object("ctl-1.text").is_some());
        assert_eq!(
            ctx.read_cached_value("ctl-1.text"),
            Some(StateValue::Text("21.5 °C".into()))
        );

        let uuid = ControllerUuid::from("st-1");
        let handler: Arc<dyn EventHandler> =
            Arc::new(|_event: ControllerEvent| async { Ok::<(), crate::error::BridgeError>(()) });
        ctx.register_event_handler(uuid.clone(), handler, Some("text"));
        assert_eq!(bridge.dispatcher().handler_count(&uuid), 2);
        assert!(ctx.unregister_event_handler(&uuid, "text"));
        assert!(!ctx.unregister_event_handler(&uuid, "text"));
        assert_eq!(bridge.dispatcher().handler_count(&uuid), 1);
    }

    #[tokio::test]
    async fn acknowledged_host_changes_are_ignored() {
        let (bridge, _transport, _store) = bridge();
        bridge.start().await;

        let id = ItemId::from("ctl-1.value");
        assert_eq!(bridge.handle_state_change(&id, StateValue::Number(1.0), true).await, None);
        assert_eq!(
            bridge.handle_state_change(&id, StateValue::Number(1.0), false).await,
            Some(WriteOutcome::Unsupported)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_run_loop() {
        let (bridge, _transport, store) = bridge();
        bridge.start().await;

        let runner = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.run().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        bridge.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();

        assert!(!bridge.is_connected());
        assert_eq!(store.value("info.connection"), Some(StateValue::Bool(false)));
        assert_eq!(bridge.dispatcher().subject_count(), 0);
    }
}
