//! Service error types.

use std::io;

use postbox_protocol::{ConnectionError, MessageError, RemoteError};
use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur while running an endpoint.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Building, reading, or invoking a message failed locally.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Transport fault, surfaced unchanged.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The peer answered with an error reply.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// Operation timed out.
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// The pending reply was dropped without an answer.
    #[error("reply channel closed")]
    ChannelClosed,

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file did not parse.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Endpoint started outside a tokio runtime.
    #[error("no tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl ServiceError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Returns the transport fault behind this error, if any.
    pub fn connection_error(&self) -> Option<ConnectionError> {
        match self {
            Self::Connection(err) | Self::Message(MessageError::Connection(err)) => Some(*err),
            Self::Remote(remote) => remote.code.connection_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postbox_protocol::ErrorCode;

    #[test]
    fn connection_error_lookup() {
        let err = ServiceError::from(ConnectionError::Interrupted);
        assert_eq!(err.connection_error(), Some(ConnectionError::Interrupted));

        let err = ServiceError::from(MessageError::from(ConnectionError::Invalid));
        assert_eq!(err.connection_error(), Some(ConnectionError::Invalid));

        let err = ServiceError::Remote(RemoteError::new(ErrorCode::TerminationImminent, "bye"));
        assert_eq!(
            err.connection_error(),
            Some(ConnectionError::TerminationImminent)
        );

        assert_eq!(ServiceError::timeout("x").connection_error(), None);
    }

    #[test]
    fn display_includes_context() {
        let err = ServiceError::timeout("awaiting reply");
        assert_eq!(err.to_string(), "timeout during awaiting reply");

        let err = ServiceError::config("bad capacity");
        assert!(err.to_string().contains("bad capacity"));
    }
}
