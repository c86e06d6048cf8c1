//! Command acknowledgement tracking.
//!
//! Every writable item runs a small state machine. A host write is handed to the
//! item's listener (which usually sends a command) and a timer is armed until the
//! controller echoes a value change for the item. While that acknowledgement is
//! pending, further writes are not forwarded; only the most recent one is kept and
//! written once the pending acknowledgement is confirmed or times out.
//!
//! ## Key Invariants
//!
//! - At most one pending acknowledgement per item
//! - At most one queued value per pending acknowledgement; a newer write replaces it
//! - A cleared or timed-out acknowledgement never fires into a newer one

use crate::connection::ConnectionState;
use crate::counters::{CounterId, CounterReporter};
use crate::error::BridgeResult;
use crate::store::StateStore;
use crate::timer::TimerSlot;
use async_trait::async_trait;
use lxbridge_protocol::{ItemId, StateValue};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives writes for one item, typically by sending a command to the controller.
#[async_trait]
pub trait WriteListener: Send + Sync {
    /// Called with the previously written value and the value to write.
    async fn on_write(&self, previous: Option<StateValue>, value: StateValue) -> BridgeResult<()>;
}

#[async_trait]
impl<F, Fut> WriteListener for F
where
    F: Fn(Option<StateValue>, StateValue) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<()>> + Send,
{
    async fn on_write(&self, previous: Option<StateValue>, value: StateValue) -> BridgeResult<()> {
        (self)(previous, value).await
    }
}

/// Integer coercion bounds for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegerRange {
    /// Lower bound, inclusive.
    pub min: Option<i64>,
    /// Upper bound, inclusive.
    pub max: Option<i64>,
}

/// Per-item write behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Acknowledge without calling the listener when the value equals the
    /// acknowledged one.
    pub skip_if_unchanged: bool,
    /// Round and clamp written values to integers.
    pub integer: Option<IntegerRange>,
    /// Overrides the default acknowledgement timeout.
    pub ack_timeout: Option<Duration>,
    /// The controller never confirms this item; acknowledge right after writing.
    pub self_acknowledge: bool,
}

impl WriteOptions {
    /// Skips writes of the already acknowledged value.
    pub fn skip_if_unchanged(mut self) -> Self {
        self.skip_if_unchanged = true;
        self
    }

    /// Rounds written values to integers clamped into `[min, max]`.
    pub fn with_integer_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.integer = Some(IntegerRange { min, max });
        self
    }

    /// Sets the acknowledgement timeout for this item.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    /// Acknowledges writes immediately instead of waiting for the controller.
    pub fn self_acknowledging(mut self) -> Self {
        self.self_acknowledge = true;
        self
    }
}

/// What happened to a requested write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The listener was called.
    Dispatched,
    /// The value equals the acknowledged one and was acknowledged directly.
    SkippedUnchanged,
    /// An acknowledgement is pending; the value was queued.
    Delayed,
    /// An acknowledgement is pending; the value replaced a queued one.
    Superseded,
    /// Not connected; the value was dropped.
    DiscardedDisconnected,
    /// No writable item is registered under the id.
    Unsupported,
    /// The value could not be coerced to the item's type.
    Rejected,
}

struct PendingAck {
    timer: TimerSlot,
    queued: Option<StateValue>,
}

struct WritableItem {
    listener: Arc<dyn WriteListener>,
    options: WriteOptions,
    acknowledged: Option<StateValue>,
    current: Option<StateValue>,
    pending: Option<PendingAck>,
}

/// Work decided under the item lock and carried out after it is released.
enum Plan {
    Rejected,
    Skip(StateValue),
    Write {
        listener: Arc<dyn WriteListener>,
        previous: Option<StateValue>,
        value: StateValue,
        self_acknowledge: bool,
    },
}

/// Tracks pending acknowledgements for all writable items.
pub struct AckTracker {
    store: Arc<dyn StateStore>,
    connection: Arc<ConnectionState>,
    counters: Arc<CounterReporter>,
    default_timeout: Duration,
    items: Mutex<HashMap<ItemId, WritableItem>>,
    cache: RwLock<HashMap<ItemId, StateValue>>,
    reported_unsupported: Mutex<HashSet<ItemId>>,
}

impl AckTracker {
    /// Creates a tracker without items.
    pub fn new(
        store: Arc<dyn StateStore>,
        connection: Arc<ConnectionState>,
        counters: Arc<CounterReporter>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            connection,
            counters,
            default_timeout,
            items: Mutex::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            reported_unsupported: Mutex::new(HashSet::new()),
        }
    }

    /// Registers a writable item, replacing an existing registration and its
    /// pending acknowledgement.
    pub fn register(&self, id: ItemId, listener: Arc<dyn WriteListener>, options: WriteOptions) {
        let acknowledged = self.cache.read().get(&id).cloned();
        let item = WritableItem {
            listener,
            options,
            current: acknowledged.clone(),
            acknowledged,
            pending: None,
        };
        if self.items.lock().insert(id.clone(), item).is_some() {
            debug!(item = %id, "writable item replaced");
        }
    }

    /// Removes every writable item. Pending timers are cancelled.
    pub fn clear(&self) {
        let cleared = std::mem::take(&mut *self.items.lock());
        debug!(items = cleared.len(), "writable items cleared");
    }

    /// Cancels every pending acknowledgement and drops queued values.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for item in self.items.lock().values_mut() {
            if item.pending.take().is_some() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Returns true if a writable item is registered under the id.
    pub fn is_registered(&self, id: &str) -> bool {
        self.items.lock().contains_key(id)
    }

    /// Returns the number of registered items.
    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true while a write to the item awaits confirmation.
    pub fn has_pending(&self, id: &str) -> bool {
        self.items
            .lock()
            .get(id)
            .is_some_and(|item| item.pending.is_some())
    }

    /// Returns the value queued behind a pending acknowledgement.
    pub fn queued_value(&self, id: &str) -> Option<StateValue> {
        self.items
            .lock()
            .get(id)
            .and_then(|item| item.pending.as_ref())
            .and_then(|pending| pending.queued.clone())
    }

    /// Returns the last acknowledged value of an item.
    pub fn cached_value(&self, id: &str) -> Option<StateValue> {
        self.cache.read().get(id).cloned()
    }

    /// Handles a write requested by the host.
    pub async fn dispatch(self: &Arc<Self>, id: &ItemId, value: StateValue) -> WriteOutcome {
        let plan = {
            let mut items = self.items.lock();
            let Some(item) = items.get_mut(id) else {
                drop(items);
                self.report_unsupported(id, value);
                return WriteOutcome::Unsupported;
            };

            if !self.connection.is_connected() {
                info!(item = %id, value = %value, "write discarded while disconnected");
                return WriteOutcome::DiscardedDisconnected;
            }

            if let Some(pending) = item.pending.as_mut() {
                return match pending.queued.replace(value.clone()) {
                    Some(old) => {
                        debug!(item = %id, discarded = %old, value = %value, "queued write superseded");
                        WriteOutcome::Superseded
                    }
                    None => {
                        debug!(item = %id, value = %value, "write delayed until acknowledgement");
                        WriteOutcome::Delayed
                    }
                };
            }

            self.begin_write(id, item, value)
        };

        self.finish(id, plan).await
    }

    /// Handles the controller's confirmation of a write.
    ///
    /// Clears the pending acknowledgement and writes the queued value, if any.
    /// Returns false if no acknowledgement was pending.
    pub async fn on_confirmation(self: &Arc<Self>, id: &ItemId) -> bool {
        let plan = {
            let mut items = self.items.lock();
            let Some(item) = items.get_mut(id) else {
                return false;
            };
            let Some(pending) = item.pending.take() else {
                return false;
            };
            debug!(item = %id, "write acknowledged");
            let PendingAck { timer, queued } = pending;
            drop(timer);
            queued.map(|value| self.begin_write(id, item, value))
        };

        if let Some(plan) = plan {
            self.finish(id, plan).await;
        }
        true
    }

    /// Records a value as confirmed and writes it through to the host store.
    pub async fn acknowledge(&self, id: &ItemId, value: StateValue) -> BridgeResult<()> {
        if let Some(item) = self.items.lock().get_mut(id) {
            item.acknowledged = Some(value.clone());
            item.current = Some(value.clone());
        }
        self.cache.write().insert(id.clone(), value.clone());
        self.store.set_state(id, value, true).await
    }

    /// Decides how to write `value`; arms the acknowledgement timer if one is needed.
    ///
    /// Host writes and queued values released by a confirmation or timeout both go through here.
    fn begin_write(self: &Arc<Self>, id: &ItemId, item: &mut WritableItem, value: StateValue) -> Plan {
        let value = match item.options.integer {
            Some(range) => match value.to_clamped_integer(range.min, range.max) {
                Some(value) => value,
                None => {
                    warn!(item = %id, value = %value, "write rejected, not a number");
                    return Plan::Rejected;
                }
            },
            None => value,
        };

        if item.options.skip_if_unchanged && item.acknowledged.as_ref() == Some(&value) {
            return Plan::Skip(value);
        }

        if !item.options.self_acknowledge {
            let timeout = item.options.ack_timeout.unwrap_or(self.default_timeout);
            let tracker = Arc::downgrade(self);
            let timer_id = id.clone();
            let mut timer = TimerSlot::new();
            timer.arm(timeout, move |generation| async move {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.on_ack_timeout(timer_id, generation).await;
                }
            });
            item.pending = Some(PendingAck {
                timer,
                queued: None,
            });
        }

        Plan::Write {
            listener: Arc::clone(&item.listener),
            previous: item.current.replace(value.clone()),
            value,
            self_acknowledge: item.options.self_acknowledge,
        }
    }

    async fn finish(&self, id: &ItemId, plan: Plan) -> WriteOutcome {
        match plan {
            Plan::Rejected => WriteOutcome::Rejected,
            Plan::Skip(value) => {
                debug!(item = %id, value = %value, "write unchanged, acknowledging");
                if let Err(e) = self.acknowledge(id, value).await {
                    warn!(item = %id, error = %e, "failed to acknowledge value");
                }
                WriteOutcome::SkippedUnchanged
            }
            Plan::Write {
                listener,
                previous,
                value,
                self_acknowledge,
            } => {
                debug!(item = %id, value = %value, "writing value");
                if let Err(e) = listener.on_write(previous, value.clone()).await {
                    warn!(item = %id, error = %e, "write listener failed");
                }
                if self_acknowledge {
                    if let Err(e) = self.acknowledge(id, value).await {
                        warn!(item = %id, error = %e, "failed to acknowledge value");
                    }
                }
                WriteOutcome::Dispatched
            }
        }
    }

    async fn on_ack_timeout(self: Arc<Self>, id: ItemId, generation: u64) {
        let (unconfirmed, plan) = {
            let mut items = self.items.lock();
            let Some(item) = items.get_mut(&id) else {
                return;
            };
            let fired = item
                .pending
                .as_mut()
                .is_some_and(|pending| pending.timer.take_fired(generation));
            if !fired {
                return;
            }
            let queued = item.pending.take().and_then(|pending| pending.queued);
            let unconfirmed = item.current.clone();
            (unconfirmed, queued.map(|value| self.begin_write(&id, item, value)))
        };

        warn!(item = %id, "write not acknowledged in time");
        self.counters
            .increment_detail(CounterId::AckTimeouts, id.as_str(), unconfirmed);

        if let Some(plan) = plan {
            self.finish(&id, plan).await;
        }
    }

    fn report_unsupported(&self, id: &ItemId, value: StateValue) {
        if self.reported_unsupported.lock().insert(id.clone()) {
            warn!(item = %id, value = %value, "write to an item that accepts no writes");
        }
        self.counters
            .increment_detail(CounterId::UnsupportedWrites, id.as_str(), Some(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandChannel, CommandListener};
    use crate::store::MemoryStateStore;
    use crate::transport::MockTransport;
    use lxbridge_protocol::ControllerUuid;
    use proptest::prelude::*;

    type Calls = Arc<Mutex<Vec<(Option<StateValue>, StateValue)>>>;

    struct Fixture {
        tracker: Arc<AckTracker>,
        store: Arc<MemoryStateStore>,
        counters: Arc<CounterReporter>,
        connection: Arc<ConnectionState>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStateStore::new());
        let connection = Arc::new(ConnectionState::new());
        connection.set_connected(true);
        let counters = Arc::new(CounterReporter::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            Duration::from_secs(30),
        ));
        let tracker = Arc::new(AckTracker::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            Arc::clone(&connection),
            Arc::clone(&counters),
            Duration::from_millis(500),
        ));
        Fixture {
            tracker,
            store,
            counters,
            connection,
        }
    }

    fn recording_listener(calls: &Calls) -> Arc<dyn WriteListener> {
        let calls = Arc::clone(calls);
        Arc::new(move |previous: Option<StateValue>, value: StateValue| {
            calls.lock().push((previous, value));
            async { Ok::<(), crate::error::BridgeError>(()) }
        })
    }

    fn num(n: f64) -> StateValue {
        StateValue::Number(n)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_write_flushes_on_timeout() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker.register(
            id.clone(),
            recording_listener(&calls),
            WriteOptions::default().with_ack_timeout(Duration::from_millis(100)),
        );

        assert_eq!(f.tracker.dispatch(&id, num(5.0)).await, WriteOutcome::Dispatched);
        assert_eq!(*calls.lock(), vec![(None, num(5.0))]);
        assert!(f.tracker.has_pending("a"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.tracker.dispatch(&id, num(7.0)).await, WriteOutcome::Delayed);
        assert_eq!(calls.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(51)).await;
        settle().await;
        assert_eq!(
            *calls.lock(),
            vec![(None, num(5.0)), (Some(num(5.0)), num(7.0))]
        );
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 1);
        let details = f.counters.details(CounterId::AckTimeouts);
        assert_eq!(details[0].id, "a");
        assert_eq!(details[0].last_value, Some(num(5.0)));

        // The write of 7 armed a fresh timer.
        assert!(f.tracker.has_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rearms_for_queued_value_when_listener_fails() {
        let f = fixture();
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let channel = Arc::new(CommandChannel::new(
            Arc::new(MockTransport::new()),
            Arc::new(CounterReporter::new(store, Duration::from_secs(30))),
            Arc::new(ConnectionState::new()),
        ));
        let id = ItemId::from("a");
        f.tracker.register(
            id.clone(),
            Arc::new(CommandListener::new(channel, ControllerUuid::from("0f1e-ab"))),
            WriteOptions::default().with_ack_timeout(Duration::from_millis(100)),
        );

        // The command channel is offline, so every listener call fails.
        assert_eq!(f.tracker.dispatch(&id, num(1.0)).await, WriteOutcome::Dispatched);
        assert_eq!(f.tracker.dispatch(&id, num(2.0)).await, WriteOutcome::Delayed);

        tokio::time::sleep(Duration::from_millis(101)).await;
        settle().await;
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 1);
        assert!(f.tracker.has_pending("a"));
        assert_eq!(f.tracker.queued_value("a"), None);

        tokio::time::sleep(Duration::from_millis(101)).await;
        settle().await;
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 2);
        assert!(!f.tracker.has_pending("a"));
        let details = f.counters.details(CounterId::AckTimeouts);
        assert_eq!(details[0].last_value, Some(num(2.0)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn later_write_supersedes_queued_one() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());

        f.tracker.dispatch(&id, num(1.0)).await;
        assert_eq!(f.tracker.dispatch(&id, num(2.0)).await, WriteOutcome::Delayed);
        assert_eq!(f.tracker.dispatch(&id, num(3.0)).await, WriteOutcome::Superseded);
        assert_eq!(f.tracker.queued_value("a"), Some(num(3.0)));

        assert!(f.tracker.on_confirmation(&id).await);
        assert_eq!(
            *calls.lock(),
            vec![(None, num(1.0)), (Some(num(1.0)), num(3.0))]
        );
        assert_eq!(f.tracker.queued_value("a"), None);
        assert!(f.tracker.has_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_clears_timer() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());

        f.tracker.dispatch(&id, num(1.0)).await;
        assert!(f.tracker.on_confirmation(&id).await);
        assert!(!f.tracker.has_pending("a"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 0);
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn confirmation_without_pending_is_noop() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());

        assert!(!f.tracker.on_confirmation(&id).await);
        assert!(!f.tracker.on_confirmation(&ItemId::from("unknown")).await);
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn unsupported_write_is_reported_once() {
        let f = fixture();
        let id = ItemId::from("nothing.here");

        assert_eq!(f.tracker.dispatch(&id, num(1.0)).await, WriteOutcome::Unsupported);
        assert_eq!(f.tracker.dispatch(&id, num(2.0)).await, WriteOutcome::Unsupported);

        assert_eq!(f.tracker.reported_unsupported.lock().len(), 1);
        assert_eq!(f.counters.value(CounterId::UnsupportedWrites), 2);
        let details = f.counters.details(CounterId::UnsupportedWrites);
        assert_eq!(details[0].count, 2);
        assert_eq!(details[0].last_value, Some(num(2.0)));
    }

    #[tokio::test]
    async fn disconnected_write_is_discarded() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());
        f.connection.set_connected(false);

        assert_eq!(
            f.tracker.dispatch(&id, num(1.0)).await,
            WriteOutcome::DiscardedDisconnected
        );
        assert!(calls.lock().is_empty());
        assert!(!f.tracker.has_pending("a"));
    }

    #[tokio::test]
    async fn unchanged_value_is_acknowledged_without_listener() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker.register(
            id.clone(),
            recording_listener(&calls),
            WriteOptions::default().skip_if_unchanged(),
        );
        f.tracker.acknowledge(&id, StateValue::Bool(true)).await.unwrap();

        assert_eq!(
            f.tracker.dispatch(&id, StateValue::Bool(true)).await,
            WriteOutcome::SkippedUnchanged
        );
        assert!(calls.lock().is_empty());
        assert!(!f.tracker.has_pending("a"));
        assert_eq!(
            f.store.writes_for("a"),
            vec![StateValue::Bool(true), StateValue::Bool(true)]
        );
    }

    #[tokio::test]
    async fn self_acknowledging_item_has_no_timer() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker.register(
            id.clone(),
            recording_listener(&calls),
            WriteOptions::default().self_acknowledging(),
        );

        assert_eq!(f.tracker.dispatch(&id, num(4.0)).await, WriteOutcome::Dispatched);
        assert!(!f.tracker.has_pending("a"));
        assert_eq!(f.tracker.cached_value("a"), Some(num(4.0)));
        assert!(f.store.state("a").unwrap().ack);
    }

    #[tokio::test]
    async fn integer_coercion_clamps_and_rejects() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker.register(
            id.clone(),
            recording_listener(&calls),
            WriteOptions::default()
                .self_acknowledging()
                .with_integer_range(Some(0), Some(100)),
        );

        f.tracker.dispatch(&id, num(150.4)).await;
        f.tracker.dispatch(&id, num(41.6)).await;
        assert_eq!(
            f.tracker.dispatch(&id, StateValue::from("dim")).await,
            WriteOutcome::Rejected
        );
        assert_eq!(
            *calls.lock(),
            vec![(None, num(100.0)), (Some(num(100.0)), num(42.0))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reregistration_cancels_pending() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());
        f.tracker.dispatch(&id, num(1.0)).await;

        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());
        assert!(!f.tracker.has_pending("a"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(f.counters.value(CounterId::AckTimeouts), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_queued_values() {
        let f = fixture();
        let calls = Calls::default();
        let id = ItemId::from("a");
        f.tracker
            .register(id.clone(), recording_listener(&calls), WriteOptions::default());
        f.tracker.dispatch(&id, num(1.0)).await;
        f.tracker.dispatch(&id, num(2.0)).await;

        assert_eq!(f.tracker.cancel_all(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(calls.lock().len(), 1);
    }

    proptest! {
        #[test]
        fn only_last_queued_value_is_delivered(values in proptest::collection::vec(0i32..1000, 1..20)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let delivered = rt.block_on(async {
                let f = fixture();
                let calls = Calls::default();
                let id = ItemId::from("a");
                f.tracker.register(id.clone(), recording_listener(&calls), WriteOptions::default());

                for v in &values {
                    f.tracker.dispatch(&id, num(f64::from(*v))).await;
                }
                tokio::time::sleep(Duration::from_millis(501)).await;
                settle().await;

                let delivered: Vec<StateValue> = calls.lock().iter().map(|(_, v)| v.clone()).collect();
                delivered
            });

            let mut expected = vec![num(f64::from(values[0]))];
            if values.len() > 1 {
                expected.push(num(f64::from(values[values.len() - 1])));
            }
            prop_assert_eq!(delivered, expected);
        }
    }
}
