//! Identifier namespaces.
//!
//! Host-side item paths and controller-side UUIDs are distinct types. They are
//! correlated only through explicit registration, never by converting one into
//! the other.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Characters the host platform does not accept inside an item path.
const FORBIDDEN_ITEM_CHARS: &[char] = &['*', '?', '[', ']', '"', '\'', ',', ';', '<', '>', '\\'];

/// Path of a synchronized item in the host store (e.g. `kitchen.light.active`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an item id without validation.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Creates an item id, rejecting empty segments and characters the host forbids.
    pub fn parse(path: &str) -> ProtocolResult<Self> {
        let valid = !path.is_empty()
            && path.split('.').all(|segment| !segment.is_empty())
            && !path
                .chars()
                .any(|c| c.is_whitespace() || FORBIDDEN_ITEM_CHARS.contains(&c));

        if valid {
            Ok(Self(path.to_string()))
        } else {
            Err(ProtocolError::InvalidIdentifier(path.to_string()))
        }
    }

    /// Returns the path appended with one more segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}.{}", self.0, segment))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Controller-side subject of an event or command.
///
/// Controller UUIDs are compared verbatim; the controller always reports them
/// in the same lowercase form it uses in the structure description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerUuid(String);

impl ControllerUuid {
    /// Creates a controller UUID.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// Returns the UUID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControllerUuid {
    fn from(uuid: &str) -> Self {
        Self::new(uuid)
    }
}

impl Borrow<str> for ControllerUuid {
    fn borrow(&self) -> &str {
        &self.0
    }
}
