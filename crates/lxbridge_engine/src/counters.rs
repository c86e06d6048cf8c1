//! Aggregate counters with rate-limited persistence.
//!
//! Counters are incremented in memory and written to the host store at most once
//! per flush interval. The first change after a quiet period is persisted at once;
//! changes made while the flush timer is armed are picked up when it expires. No
//! increment is lost, only the write frequency is capped.
//!
//! ## Key Invariants
//!
//! - Writes of one counter land in increasing value order; a snapshot older than
//!   the one already written is dropped
//! - `shutdown` writes the final value last

use crate::store::{ObjectCommon, StateStore};
use crate::timer::TimerSlot;
use lxbridge_protocol::{ItemId, StateValue, ValueType};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// The fixed set of counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterId {
    /// Events delivered by the transport.
    EventsReceived,
    /// Events for which no handler is registered.
    UnknownEvents,
    /// Commands sent to the controller.
    CommandsSent,
    /// Host writes to items that accept no writes.
    UnsupportedWrites,
    /// Local writes that were not confirmed in time.
    AckTimeouts,
}

impl CounterId {
    /// All counters.
    pub const ALL: [CounterId; 5] = [
        CounterId::EventsReceived,
        CounterId::UnknownEvents,
        CounterId::CommandsSent,
        CounterId::UnsupportedWrites,
        CounterId::AckTimeouts,
    ];

    /// Returns the counter name used in item paths.
    pub fn name(&self) -> &'static str {
        match self {
            CounterId::EventsReceived => "eventsReceived",
            CounterId::UnknownEvents => "unknownEvents",
            CounterId::CommandsSent => "commandsSent",
            CounterId::UnsupportedWrites => "unsupportedWrites",
            CounterId::AckTimeouts => "ackTimeouts",
        }
    }

    /// Returns true if the counter keeps a per-subject breakdown.
    pub fn has_details(&self) -> bool {
        matches!(
            self,
            CounterId::UnknownEvents | CounterId::UnsupportedWrites | CounterId::AckTimeouts
        )
    }

    /// Returns the item the counter value is persisted to.
    pub fn item_id(&self) -> ItemId {
        ItemId::new(format!("info.{}", self.name()))
    }

    /// Returns the item the breakdown is persisted to, if the counter has one.
    pub fn detail_item_id(&self) -> Option<ItemId> {
        self.has_details()
            .then(|| ItemId::new(format!("info.{}Detail", self.name())))
    }
}

/// One entry of a counter breakdown, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDetail {
    /// Subject the increments were recorded for.
    pub id: String,
    /// Number of increments for this subject.
    pub count: u64,
    /// Value passed with the latest increment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value: Option<StateValue>,
}

#[derive(Default)]
struct DetailEntry {
    count: u64,
    last_value: Option<StateValue>,
}

struct CounterEntry {
    value: u64,
    persisted: Option<u64>,
    timer: TimerSlot,
    details: Option<BTreeMap<String, DetailEntry>>,
}

impl CounterEntry {
    fn new(id: CounterId) -> Self {
        Self {
            value: 0,
            persisted: None,
            timer: TimerSlot::new(),
            details: id.has_details().then(BTreeMap::new),
        }
    }

    fn snapshot(&self) -> CounterSnapshot {
        let details = self.details.as_ref().map(|details| {
            details
                .iter()
                .map(|(id, entry)| CounterDetail {
                    id: id.clone(),
                    count: entry.count,
                    last_value: entry.last_value.clone(),
                })
                .collect()
        });
        CounterSnapshot {
            value: self.value,
            details,
        }
    }
}

struct CounterSnapshot {
    value: u64,
    details: Option<Vec<CounterDetail>>,
}

/// Serializes counter writes to the host store.
struct CounterWriter {
    store: Arc<dyn StateStore>,
    written: tokio::sync::Mutex<HashMap<CounterId, u64>>,
}

impl CounterWriter {
    async fn persist(&self, id: CounterId, snapshot: CounterSnapshot) {
        // Held across the store writes so two snapshots of a counter never interleave.
        let mut written = self.written.lock().await;
        if written.get(&id).is_some_and(|&last| last >= snapshot.value) {
            debug!(counter = id.name(), value = snapshot.value, "stale counter write dropped");
            return;
        }
        written.insert(id, snapshot.value);

        let value = StateValue::Number(snapshot.value as f64);
        if let Err(e) = self.store.set_state(&id.item_id(), value, true).await {
            warn!(counter = id.name(), error = %e, "failed to persist counter");
        }

        let (Some(detail_id), Some(details)) = (id.detail_item_id(), snapshot.details) else {
            return;
        };
        match serde_json::to_string(&details) {
            Ok(json) => {
                if let Err(e) = self.store.set_state(&detail_id, StateValue::Text(json), true).await {
                    warn!(counter = id.name(), error = %e, "failed to persist counter details");
                }
            }
            Err(e) => error!(counter = id.name(), error = %e, "failed to encode counter details"),
        }
    }
}

/// Maintains the counters and persists them through the host store.
pub struct CounterReporter {
    store: Arc<dyn StateStore>,
    writer: Arc<CounterWriter>,
    flush_interval: Duration,
    entries: Mutex<HashMap<CounterId, CounterEntry>>,
}

impl CounterReporter {
    /// Creates a reporter with every counter at zero.
    pub fn new(store: Arc<dyn StateStore>, flush_interval: Duration) -> Self {
        let entries = CounterId::ALL
            .iter()
            .map(|id| (*id, CounterEntry::new(*id)))
            .collect();
        let writer = Arc::new(CounterWriter {
            store: Arc::clone(&store),
            written: tokio::sync::Mutex::new(HashMap::new()),
        });
        Self {
            store,
            writer,
            flush_interval,
            entries: Mutex::new(entries),
        }
    }

    /// Declares the counter objects and publishes their current values.
    pub async fn initialize(&self) {
        for id in CounterId::ALL {
            let common = ObjectCommon::new(id.name(), "value", ValueType::Number);
            if let Err(e) = self.store.set_object(&id.item_id(), common).await {
                warn!(counter = id.name(), error = %e, "failed to declare counter");
            }
            if let Some(detail_id) = id.detail_item_id() {
                let common =
                    ObjectCommon::new(format!("{} details", id.name()), "json", ValueType::String);
                if let Err(e) = self.store.set_object(&detail_id, common).await {
                    warn!(counter = id.name(), error = %e, "failed to declare counter details");
                }
            }

            let snapshot = {
                let mut entries = self.entries.lock();
                let Some(entry) = entries.get_mut(&id) else {
                    error!(counter = id.name(), "counter entry missing");
                    continue;
                };
                entry.persisted = Some(entry.value);
                entry.snapshot()
            };
            self.writer.persist(id, snapshot).await;
        }
    }

    /// Increments a counter.
    pub fn increment(self: &Arc<Self>, id: CounterId) {
        self.record(id, None, None);
    }

    /// Increments a counter and records the increment for one subject.
    ///
    /// For counters without a breakdown the subject is ignored.
    pub fn increment_detail(
        self: &Arc<Self>,
        id: CounterId,
        detail_id: &str,
        detail_value: Option<StateValue>,
    ) {
        self.record(id, Some(detail_id), detail_value);
    }

    /// Returns the in-memory value of a counter.
    pub fn value(&self, id: CounterId) -> u64 {
        self.entries.lock().get(&id).map_or(0, |e| e.value)
    }

    /// Returns the breakdown of a counter, ordered by subject.
    pub fn details(&self, id: CounterId) -> Vec<CounterDetail> {
        self.entries
            .lock()
            .get(&id)
            .and_then(|e| e.snapshot().details)
            .unwrap_or_default()
    }

    /// Returns true while a flush timer is armed for the counter.
    pub fn is_flush_pending(&self, id: CounterId) -> bool {
        self.entries.lock().get(&id).is_some_and(|e| e.timer.is_armed())
    }

    /// Cancels every flush timer and persists pending values immediately.
    pub async fn shutdown(&self) {
        let pending: Vec<(CounterId, CounterSnapshot)> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter_map(|(id, entry)| {
                    entry.timer.cancel();
                    if entry.persisted == Some(entry.value) {
                        return None;
                    }
                    entry.persisted = Some(entry.value);
                    Some((*id, entry.snapshot()))
                })
                .collect()
        };

        for (id, snapshot) in pending {
            self.writer.persist(id, snapshot).await;
        }
    }

    fn record(self: &Arc<Self>, id: CounterId, detail_id: Option<&str>, detail_value: Option<StateValue>) {
        let flush_now = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&id) else {
                error!(counter = id.name(), "counter entry missing");
                return;
            };
            entry.value += 1;
            if let (Some(details), Some(detail_id)) = (entry.details.as_mut(), detail_id) {
                let detail = details.entry(detail_id.to_string()).or_default();
                detail.count += 1;
                detail.last_value = detail_value;
            }
            !entry.timer.is_armed()
        };

        if flush_now {
            self.flush_if_changed(id);
        }
    }

    /// Persists the counter if it changed since the last write, then arms the
    /// rate-limit timer.
    fn flush_if_changed(self: &Arc<Self>, id: CounterId) {
        let snapshot = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&id) else {
                error!(counter = id.name(), "counter entry missing");
                return;
            };
            if entry.persisted == Some(entry.value) {
                return;
            }
            entry.persisted = Some(entry.value);

            let reporter = Arc::downgrade(self);
            entry.timer.arm(self.flush_interval, move |generation| async move {
                if let Some(reporter) = reporter.upgrade() {
                    reporter.on_flush_timer(id, generation);
                }
            });
            entry.snapshot()
        };

        debug!(counter = id.name(), value = snapshot.value, "persisting counter");
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            writer.persist(id, snapshot).await;
        });
    }

    fn on_flush_timer(self: &Arc<Self>, id: CounterId, generation: u64) {
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&id) else {
                error!(counter = id.name(), "counter entry missing");
                return;
            };
            if !entry.timer.take_fired(generation) {
                return;
            }
        }
        self.flush_if_changed(id);
    }
}
