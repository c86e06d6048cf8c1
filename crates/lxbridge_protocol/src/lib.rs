//! # lxbridge Protocol
//!
//! Controller-side types for lxbridge.
//!
//! This crate provides:
//! - `ItemId` and `ControllerUuid`, the two identifier namespaces
//! - `StateValue`, the value model shared by events, writes and the host store
//! - `ControllerEvent` and `EventKind` for pushed value changes
//! - Command paths sent to the controller
//! - `StructureFile`, a typed shell around the controller's structure description
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod error;
mod event;
mod ids;
mod structure;
mod value;

pub use command::{Command, ENABLE_UPDATES_PATH, STRUCTURE_PATH};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{CloseReason, ControllerEvent, EventKind};
pub use ids::{ControllerUuid, ItemId};
pub use structure::{ControlDescriptor, MiniserverInfo, StateRef, StructureFile, StructureSection};
pub use value::{StateValue, ValueType};
