//! Structure command implementation.

use lxbridge_engine::ControlKind;
use lxbridge_protocol::{ControlDescriptor, StructureFile};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Structure summary.
#[derive(Debug, Serialize)]
pub struct StructureSummary {
    /// Controller name.
    pub controller: String,
    /// Last modification stamp.
    pub last_modified: String,
    /// Number of rooms.
    pub rooms: usize,
    /// Number of categories.
    pub categories: usize,
    /// Number of controls, sub-controls included.
    pub controls: usize,
    /// Number of state subjects.
    pub states: usize,
    /// Controls per kind.
    pub kinds: BTreeMap<String, usize>,
    /// Control types that map to no known kind, with their counts.
    pub unknown_types: BTreeMap<String, usize>,
    /// Top-level controls per room name.
    pub by_room: BTreeMap<String, usize>,
    /// Top-level controls per category name.
    pub by_category: BTreeMap<String, usize>,
}

const UNASSIGNED: &str = "(none)";

/// Builds the summary of a parsed structure.
pub fn summarize(structure: &StructureFile) -> StructureSummary {
    let mut summary = StructureSummary {
        controller: structure.ms_info.ms_name.clone(),
        last_modified: structure.last_modified.clone(),
        rooms: structure.rooms.len(),
        categories: structure.cats.len(),
        controls: 0,
        states: 0,
        kinds: BTreeMap::new(),
        unknown_types: BTreeMap::new(),
        by_room: BTreeMap::new(),
        by_category: BTreeMap::new(),
    };

    for control in structure.controls.values() {
        let room = control
            .room
            .as_ref()
            .and_then(|uuid| structure.room_name(uuid))
            .unwrap_or(UNASSIGNED);
        *summary.by_room.entry(room.to_string()).or_default() += 1;

        let category = control
            .cat
            .as_ref()
            .and_then(|uuid| structure.category_name(uuid))
            .unwrap_or(UNASSIGNED);
        *summary.by_category.entry(category.to_string()).or_default() += 1;
    }

    let mut pending: Vec<&ControlDescriptor> = structure.controls.values().collect();
    while let Some(control) = pending.pop() {
        let kind = ControlKind::from_type(&control.control_type);
        summary.controls += 1;
        summary.states += control.state_uuids().len();
        *summary.kinds.entry(kind.to_string()).or_default() += 1;
        if kind == ControlKind::Unknown {
            *summary
                .unknown_types
                .entry(control.control_type.clone())
                .or_default() += 1;
        }
        pending.extend(control.sub_controls.values());
    }

    summary
}

/// Runs the structure command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let structure = StructureFile::from_slice(&bytes)?;
    let summary = summarize(&structure);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => print_text_output(&summary),
    }

    Ok(())
}

fn print_text_output(summary: &StructureSummary) {
    println!("Controller: {}", summary.controller);
    println!("Modified:   {}", summary.last_modified);
    println!("Rooms:      {}", summary.rooms);
    println!("Categories: {}", summary.categories);
    println!("Controls:   {}", summary.controls);
    println!("States:     {}", summary.states);
    println!();
    println!("Controls by kind:");
    for (kind, count) in &summary.kinds {
        println!("  {kind:<16} {count}");
    }
    println!();
    println!("Controls by room:");
    for (room, count) in &summary.by_room {
        println!("  {room:<24} {count}");
    }
    println!();
    println!("Controls by category:");
    for (category, count) in &summary.by_category {
        println!("  {category:<24} {count}");
    }
    if !summary.unknown_types.is_empty() {
        println!();
        println!("Unmapped control types:");
        for (control_type, count) in &summary.unknown_types {
            println!("  {control_type:<24} {count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_sub_controls() {
        let structure = StructureFile::from_slice(
            br#"{
                "msInfo": {"msName": "Home"},
                "rooms": {"r-1": {"name": "Kitchen", "type": 0}},
                "controls": {
                    "a": {"name": "A", "type": "Switch", "uuidAction": "a", "room": "r-1",
                          "states": {"active": "a-1"}},
                    "b": {"name": "B", "type": "LightControllerV2", "uuidAction": "b",
                          "states": {"moods": ["b-1", "b-2"]},
                          "subControls": {
                              "c": {"name": "C", "type": "Dimmer", "uuidAction": "c"}
                          }}
                }
            }"#,
        )
        .unwrap();

        let summary = summarize(&structure);
        assert_eq!(summary.controller, "Home");
        assert_eq!(summary.rooms, 1);
        assert_eq!(summary.controls, 3);
        assert_eq!(summary.states, 3);
        assert_eq!(summary.kinds.get("Switch"), Some(&1));
        assert_eq!(summary.kinds.get("Unknown"), Some(&1));
        assert_eq!(summary.unknown_types.get("LightControllerV2"), Some(&1));
        assert_eq!(summary.by_room.get("Kitchen"), Some(&1));
        assert_eq!(summary.by_room.get(UNASSIGNED), Some(&1));
        assert_eq!(summary.by_category.get(UNASSIGNED), Some(&2));
    }
}
