//! Error types for the bridge engine.

use lxbridge_protocol::ProtocolError;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur inside the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Controller data could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The host store rejected a write.
    #[error("store error: {0}")]
    Store(String),

    /// An event handler or write listener failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// Not connected to the controller.
    #[error("not connected to controller")]
    NotConnected,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Transport { retryable, .. } => *retryable,
            BridgeError::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(BridgeError::transport_retryable("connection reset").is_retryable());
        let fatal = BridgeError::Transport {
            message: "bad credentials".into(),
            retryable: false,
        };
        assert!(!fatal.is_retryable());
        assert!(BridgeError::NotConnected.is_retryable());
        assert!(!BridgeError::Handler("boom".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = BridgeError::NotConnected;
        assert_eq!(err.to_string(), "not connected to controller");

        let err = BridgeError::Handler("a.b rejected".into());
        assert_eq!(err.to_string(), "handler error: a.b rejected");

        let err: BridgeError = ProtocolError::InvalidStructure("eof".into()).into();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }
}
