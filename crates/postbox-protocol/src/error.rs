//! Protocol error types.

use postbox_core::ValueKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invocation::{MethodId, TargetRef};
use crate::types::ErrorCode;

/// Result type for message operations.
pub type MessageResult<T> = Result<T, MessageError>;

/// Boxed cause carried by invocation faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error domain reported alongside connection error codes.
pub const ERROR_DOMAIN: &str = "rs.postbox";

/// Channel-level faults reported by a transport.
///
/// The numeric codes are fixed and shared by every transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionError {
    /// The channel dropped but may come back.
    #[error("connection interrupted")]
    Interrupted,

    /// The channel is permanently unusable.
    #[error("connection invalid")]
    Invalid,

    /// The peer process is about to exit.
    #[error("peer termination imminent")]
    TerminationImminent,
}

impl ConnectionError {
    /// Returns the numeric error code.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Interrupted => 1001,
            Self::Invalid => 1002,
            Self::TerminationImminent => 2001,
        }
    }

    /// Maps a numeric code back to its variant.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(Self::Interrupted),
            1002 => Some(Self::Invalid),
            2001 => Some(Self::TerminationImminent),
            _ => None,
        }
    }

    /// Returns true if the channel may recover without being rebuilt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Errors raised while building, reading, or invoking a message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Raw payload was not a dictionary.
    #[error("malformed raw payload: expected a dictionary, got {found}")]
    Decode { found: ValueKind },

    /// Key and value sequences of different lengths.
    #[error("arity mismatch: {keys} keys for {values} values")]
    ArityMismatch { keys: usize, values: usize },

    /// Alternating key/value list with a dangling key or a non-string key.
    #[error("malformed key/value list: {reason}")]
    MalformedList { reason: String },

    /// `invoke` called on a message without a resolvable invocation.
    #[error("message is not invocable")]
    NotInvocable,

    /// The dispatcher does not know the target or method.
    #[error("unresolved target: '{target}' has no method '{method}'")]
    UnresolvedTarget { target: TargetRef, method: MethodId },

    /// The dispatched call itself failed.
    #[error("invocation of '{method}' failed: {source}")]
    InvocationFault {
        method: MethodId,
        #[source]
        source: BoxError,
    },

    /// Strict accessor on an absent key.
    #[error("missing key '{key}'")]
    MissingKey { key: String },

    /// Strict accessor on a key holding another variant.
    #[error("key '{key}' holds {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Transport fault, passed through unchanged.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl MessageError {
    /// Creates a malformed list error.
    pub fn malformed_list(reason: impl Into<String>) -> Self {
        Self::MalformedList {
            reason: reason.into(),
        }
    }

    /// Creates an invocation fault from any error type.
    pub fn invocation_fault(method: impl Into<MethodId>, source: impl Into<BoxError>) -> Self {
        Self::InvocationFault {
            method: method.into(),
            source: source.into(),
        }
    }

    /// Returns the wire-level code describing this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Decode { .. }
            | Self::ArityMismatch { .. }
            | Self::MalformedList { .. }
            | Self::MissingKey { .. }
            | Self::TypeMismatch { .. } => ErrorCode::InvalidMessage,
            Self::NotInvocable => ErrorCode::NotInvocable,
            Self::UnresolvedTarget { .. } => ErrorCode::UnresolvedTarget,
            Self::InvocationFault { .. } => ErrorCode::InvocationFault,
            Self::Connection(err) => ErrorCode::from(*err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn connection_codes_are_fixed() {
        assert_eq!(ConnectionError::Interrupted.code(), 1001);
        assert_eq!(ConnectionError::Invalid.code(), 1002);
        assert_eq!(ConnectionError::TerminationImminent.code(), 2001);
    }

    #[test]
    fn connection_code_lookup() {
        for err in [
            ConnectionError::Interrupted,
            ConnectionError::Invalid,
            ConnectionError::TerminationImminent,
        ] {
            assert_eq!(ConnectionError::from_code(err.code()), Some(err));
        }
        assert_eq!(ConnectionError::from_code(1003), None);
    }

    #[test]
    fn only_interrupted_is_transient() {
        assert!(ConnectionError::Interrupted.is_transient());
        assert!(!ConnectionError::Invalid.is_transient());
        assert!(!ConnectionError::TerminationImminent.is_transient());
    }

    #[test]
    fn connection_error_passes_through() {
        let err = MessageError::from(ConnectionError::TerminationImminent);
        assert_eq!(err.to_string(), "peer termination imminent");
        assert_eq!(err.code(), ErrorCode::TerminationImminent);
    }

    #[test]
    fn invocation_fault_keeps_cause() {
        let cause = std::io::Error::other("disk on fire");
        let err = MessageError::invocation_fault("save", cause);

        assert_eq!(err.code(), ErrorCode::InvocationFault);
        assert!(err.to_string().contains("save"));
        let source = err.source().expect("cause attached");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn construction_errors_map_to_invalid_message() {
        let err = MessageError::ArityMismatch { keys: 2, values: 1 };
        assert_eq!(err.code(), ErrorCode::InvalidMessage);
        assert_eq!(err.to_string(), "arity mismatch: 2 keys for 1 values");
    }
}
