//! Outbound command paths.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::ControllerUuid;

/// Request path of the structure description.
pub const STRUCTURE_PATH: &str = "data/LoxAPP3.json";

/// Request path enabling push updates for the session.
pub const ENABLE_UPDATES_PATH: &str = "jdev/sps/enablebinstatusupdate";

/// A command addressed to one controller subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Target subject.
    pub uuid: ControllerUuid,
    /// Action, e.g. `on`, `pulse` or a numeric value.
    pub action: String,
}

impl Command {
    /// Creates a command.
    pub fn new(uuid: ControllerUuid, action: impl Into<String>) -> Self {
        Self {
            uuid,
            action: action.into(),
        }
    }

    /// Renders the request path for the transport.
    ///
    /// The action may contain `/` to pass sub-commands; everything else outside the
    /// unreserved URL set is percent-encoded.
    pub fn path(&self) -> ProtocolResult<String> {
        if self.uuid.as_str().is_empty() {
            return Err(ProtocolError::InvalidCommand {
                uuid: String::new(),
                reason: "empty uuid".into(),
            });
        }
        if self.action.is_empty() {
            return Err(ProtocolError::InvalidCommand {
                uuid: self.uuid.to_string(),
                reason: "empty action".into(),
            });
        }
        Ok(format!(
            "jdev/sps/io/{}/{}",
            self.uuid,
            encode_action(&self.action)
        ))
    }
}

fn encode_action(action: &str) -> String {
    let mut out = String::with_capacity(action.len());
    for byte in action.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
