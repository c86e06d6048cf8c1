//! Structure description shell.
//!
//! The controller describes its devices, rooms and categories in one JSON document
//! that is fetched once per (re)connection. This module only gives that document a
//! typed outline; interpreting control-specific `details` is left to control loaders.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::ControllerUuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed structure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureFile {
    /// Last modification stamp reported by the controller.
    #[serde(default)]
    pub last_modified: String,
    /// Controller identification.
    #[serde(default)]
    pub ms_info: MiniserverInfo,
    /// Top-level controls keyed by UUID.
    pub controls: BTreeMap<ControllerUuid, ControlDescriptor>,
    /// Rooms keyed by UUID.
    #[serde(default)]
    pub rooms: BTreeMap<ControllerUuid, StructureSection>,
    /// Categories keyed by UUID.
    #[serde(default)]
    pub cats: BTreeMap<ControllerUuid, StructureSection>,
}

/// Controller identification block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniserverInfo {
    /// Serial number.
    #[serde(default)]
    pub serial_nr: String,
    /// Configured controller name.
    #[serde(default)]
    pub ms_name: String,
    /// Project name.
    #[serde(default)]
    pub project_name: String,
}

/// A room or category entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSection {
    /// Display name.
    pub name: String,
    /// Section type, when reported. Rooms use a number, categories a string.
    #[serde(default, rename = "type")]
    pub section_type: Option<serde_json::Value>,
}

/// One control and its state subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescriptor {
    /// Display name.
    pub name: String,
    /// Controller-specific control type (e.g. `Switch`).
    #[serde(rename = "type")]
    pub control_type: String,
    /// Subject commands for this control are addressed to.
    pub uuid_action: ControllerUuid,
    /// Room the control belongs to.
    #[serde(default)]
    pub room: Option<ControllerUuid>,
    /// Category the control belongs to.
    #[serde(default)]
    pub cat: Option<ControllerUuid>,
    /// Named state subjects.
    #[serde(default)]
    pub states: BTreeMap<String, StateRef>,
    /// Control-specific details, passed through untouched.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Nested controls.
    #[serde(default)]
    pub sub_controls: BTreeMap<ControllerUuid, ControlDescriptor>,
}

/// A state entry refers to one subject or to a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    /// Single subject.
    Single(ControllerUuid),
    /// Indexed subjects.
    Many(Vec<ControllerUuid>),
}

impl StructureFile {
    /// Parses a structure description from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::InvalidStructure("empty document".into()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns the number of controls, sub-controls included.
    pub fn control_count(&self) -> usize {
        fn count(controls: &BTreeMap<ControllerUuid, ControlDescriptor>) -> usize {
            controls
                .values()
                .map(|c| 1 + count(&c.sub_controls))
                .sum()
        }
        count(&self.controls)
    }

    /// Returns the room name for a UUID.
    pub fn room_name(&self, uuid: &ControllerUuid) -> Option<&str> {
        self.rooms.get(uuid).map(|r| r.name.as_str())
    }

    /// Returns the category name for a UUID.
    pub fn category_name(&self, uuid: &ControllerUuid) -> Option<&str> {
        self.cats.get(uuid).map(|c| c.name.as_str())
    }
}

impl ControlDescriptor {
    /// Flattens the state table into `(name, uuid)` pairs.
    ///
    /// Indexed entries are named `<name><index>`.
    pub fn state_uuids(&self) -> Vec<(String, ControllerUuid)> {
        let mut out = Vec::new();
        for (name, state) in &self.states {
            match state {
                StateRef::Single(uuid) => out.push((name.clone(), uuid.clone())),
                StateRef::Many(uuids) => {
                    for (i, uuid) in uuids.iter().enumerate() {
                        out.push((format!("{name}{i}"), uuid.clone()));
                    }
                }
            }
        }
        out
    }
}
