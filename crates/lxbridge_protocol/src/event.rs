//! Events pushed by the controller.

use crate::ids::ControllerUuid;
use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event table an inbound event was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Numeric value event.
    #[default]
    Value,
    /// Text event.
    Text,
    /// Daytimer schedule event, forwarded as opaque text.
    Daytimer,
    /// Weather event, forwarded as opaque text.
    Weather,
}

/// A value change pushed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerEvent {
    /// Subject of the event.
    pub uuid: ControllerUuid,
    /// Raw value as delivered by the transport.
    pub value: StateValue,
    /// Event table.
    #[serde(default)]
    pub kind: EventKind,
}

impl ControllerEvent {
    /// Creates a numeric value event.
    pub fn value(uuid: impl Into<String>, value: f64) -> Self {
        Self {
            uuid: ControllerUuid::new(uuid),
            value: StateValue::Number(value),
            kind: EventKind::Value,
        }
    }

    /// Creates a text event.
    pub fn text(uuid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uuid: ControllerUuid::new(uuid),
            value: StateValue::Text(text.into()),
            kind: EventKind::Text,
        }
    }
}

/// Why the transport session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed deliberately by the local side. Never triggers a reconnect.
    Manual,
    /// Closed by the controller with a close code.
    Remote {
        /// Close code reported by the controller.
        code: u16,
    },
    /// Closed because of a transport failure.
    Error(String),
}

impl CloseReason {
    /// Returns true for a deliberate local shutdown.
    pub fn is_manual(&self) -> bool {
        matches!(self, CloseReason::Manual)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Manual => f.write_str("closed manually"),
            CloseReason::Remote { code } => write!(f, "closed by controller (code {code})"),
            CloseReason::Error(message) => write!(f, "closed on error: {message}"),
        }
    }
}
