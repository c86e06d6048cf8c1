//! Host store seam.
//!
//! Objects and states are persisted by the host platform. The engine only needs to
//! declare objects and write state values through this narrow interface.

use crate::error::BridgeResult;
use async_trait::async_trait;
use lxbridge_protocol::{ItemId, StateValue, ValueType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata of a host object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCommon {
    /// Display name.
    pub name: String,
    /// Host role (e.g. `switch`, `level.dimmer`, `value`).
    pub role: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Readable by the host.
    pub read: bool,
    /// Writable by the host.
    pub write: bool,
    /// Unit, e.g. `%`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ObjectCommon {
    /// Creates read-only metadata.
    pub fn new(name: impl Into<String>, role: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            value_type,
            read: true,
            write: false,
            unit: None,
            min: None,
            max: None,
        }
    }

    /// Marks the object writable.
    pub fn writable(mut self) -> Self {
        self.write = true;
        self
    }

    /// Sets the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the value range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// Persistence provided by the host platform.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Creates or replaces an object declaration.
    async fn set_object(&self, id: &ItemId, common: ObjectCommon) -> BridgeResult<()>;

    /// Writes a state value. `ack` marks the value as confirmed by the controller.
    async fn set_state(&self, id: &ItemId, value: StateValue, ack: bool) -> BridgeResult<()>;
}

/// A stored state value.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    /// Value.
    pub value: StateValue,
    /// Confirmation flag.
    pub ack: bool,
}

/// One recorded state write.
#[derive(Debug, Clone, PartialEq)]
pub struct StateWrite {
    /// Target item.
    pub id: ItemId,
    /// Written value.
    pub value: StateValue,
    /// Confirmation flag.
    pub ack: bool,
}

/// An in-memory host store that records every write.
pub struct MemoryStateStore {
    objects: RwLock<BTreeMap<ItemId, ObjectCommon>>,
    states: RwLock<BTreeMap<ItemId, StoredState>>,
    history: RwLock<Vec<StateWrite>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            states: RwLock::new(BTreeMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Gets an object declaration.
    pub fn object(&self, id: &str) -> Option<ObjectCommon> {
        self.objects.read().get(id).cloned()
    }

    /// Returns the number of declared objects.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Gets the current state of an item.
    pub fn state(&self, id: &str) -> Option<StoredState> {
        self.states.read().get(id).cloned()
    }

    /// Gets the current value of an item.
    pub fn value(&self, id: &str) -> Option<StateValue> {
        self.state(id).map(|s| s.value)
    }

    /// Returns a snapshot of all current states.
    pub fn states(&self) -> BTreeMap<ItemId, StoredState> {
        self.states.read().clone()
    }

    /// Returns every write in order.
    pub fn writes(&self) -> Vec<StateWrite> {
        self.history.read().clone()
    }

    /// Returns the values written to one item, in order.
    pub fn writes_for(&self, id: &str) -> Vec<StateValue> {
        self.history
            .read()
            .iter()
            .filter(|w| w.id.as_str() == id)
            .map(|w| w.value.clone())
            .collect()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn set_object(&self, id: &ItemId, common: ObjectCommon) -> BridgeResult<()> {
        self.objects.write().insert(id.clone(), common);
        Ok(())
    }

    async fn set_state(&self, id: &ItemId, value: StateValue, ack: bool) -> BridgeResult<()> {
        self.states.write().insert(
            id.clone(),
            StoredState {
                value: value.clone(),
                ack,
            },
        );
        self.history.write().push(StateWrite {
            id: id.clone(),
            value,
            ack,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_records_writes() {
        let store = MemoryStateStore::new();
        let id = ItemId::from("kitchen.light");

        store
            .set_object(&id, ObjectCommon::new("Light", "switch", ValueType::Boolean).writable())
            .await
            .unwrap();
        store.set_state(&id, StateValue::Bool(true), false).await.unwrap();
        store.set_state(&id, StateValue::Bool(false), true).await.unwrap();

        assert!(store.object("kitchen.light").unwrap().write);
        assert_eq!(
            store.state("kitchen.light"),
            Some(StoredState {
                value: StateValue::Bool(false),
                ack: true
            })
        );
        assert_eq!(
            store.writes_for("kitchen.light"),
            vec![StateValue::Bool(true), StateValue::Bool(false)]
        );
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn object_common_builder() {
        let common = ObjectCommon::new("Dimmer", "level.dimmer", ValueType::Number)
            .writable()
            .with_unit("%")
            .with_range(0.0, 100.0);
        assert!(common.read && common.write);
        assert_eq!(common.unit.as_deref(), Some("%"));
        assert_eq!(common.max, Some(100.0));

        let json = serde_json::to_value(&common).unwrap();
        assert_eq!(json["type"], "number");
    }
}
