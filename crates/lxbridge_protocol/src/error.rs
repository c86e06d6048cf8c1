//! Error types for protocol parsing.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting controller data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The structure description is not valid JSON or misses required sections.
    #[error("invalid structure description: {0}")]
    InvalidStructure(String),

    /// A command could not be rendered into a request path.
    #[error("invalid command for {uuid}: {reason}")]
    InvalidCommand {
        /// Target UUID.
        uuid: String,
        /// Why the command was rejected.
        reason: String,
    },

    /// An identifier was empty or contained forbidden characters.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::InvalidStructure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_become_structure_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProtocolError = err.into();
        assert!(matches!(err, ProtocolError::InvalidStructure(_)));
        assert!(err.to_string().starts_with("invalid structure description"));
    }

    #[test]
    fn command_error_display() {
        let err = ProtocolError::InvalidCommand {
            uuid: "0f1e".into(),
            reason: "empty action".into(),
        };
        assert_eq!(err.to_string(), "invalid command for 0f1e: empty action");
    }
}
