//! Identity, correlation, and error-reply types.

use std::fmt;

use postbox_core::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConnectionError, ERROR_DOMAIN, MessageError};

/// Per-instance message identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque value linking a reply to the request awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<MessageId> for CorrelationToken {
    fn from(id: MessageId) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CorrelationToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for CorrelationToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error codes carried by error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The message could not be decoded or read.
    InvalidMessage,

    /// The request did not describe a resolvable invocation.
    NotInvocable,

    /// The peer has no such target or method.
    UnresolvedTarget,

    /// The invoked call failed or timed out.
    InvocationFault,

    /// Transport reported an interrupted channel.
    ConnectionInterrupted,

    /// Transport reported an unusable channel.
    ConnectionInvalid,

    /// Transport reported that the peer is exiting.
    TerminationImminent,
}

impl ErrorCode {
    /// Returns the snake_case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::NotInvocable => "not_invocable",
            Self::UnresolvedTarget => "unresolved_target",
            Self::InvocationFault => "invocation_fault",
            Self::ConnectionInterrupted => "connection_interrupted",
            Self::ConnectionInvalid => "connection_invalid",
            Self::TerminationImminent => "termination_imminent",
        }
    }

    /// Parses a wire name produced by [`ErrorCode::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name {
            "invalid_message" => Self::InvalidMessage,
            "not_invocable" => Self::NotInvocable,
            "unresolved_target" => Self::UnresolvedTarget,
            "invocation_fault" => Self::InvocationFault,
            "connection_interrupted" => Self::ConnectionInterrupted,
            "connection_invalid" => Self::ConnectionInvalid,
            "termination_imminent" => Self::TerminationImminent,
            _ => return None,
        };
        Some(code)
    }

    /// Returns a human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "The message was malformed",
            Self::NotInvocable => "The message does not describe an invocation",
            Self::UnresolvedTarget => "The target or method is unknown",
            Self::InvocationFault => "The invoked call failed",
            Self::ConnectionInterrupted => "The connection was interrupted",
            Self::ConnectionInvalid => "The connection is no longer valid",
            Self::TerminationImminent => "The peer is about to terminate",
        }
    }

    /// Returns the transport fault this code stands for, if any.
    pub fn connection_error(&self) -> Option<ConnectionError> {
        match self {
            Self::ConnectionInterrupted => Some(ConnectionError::Interrupted),
            Self::ConnectionInvalid => Some(ConnectionError::Invalid),
            Self::TerminationImminent => Some(ConnectionError::TerminationImminent),
            _ => None,
        }
    }
}

impl From<ConnectionError> for ErrorCode {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Interrupted => Self::ConnectionInterrupted,
            ConnectionError::Invalid => Self::ConnectionInvalid,
            ConnectionError::TerminationImminent => Self::TerminationImminent,
        }
    }
}

/// Failure description sent back to a requester inside an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    const CODE_KEY: &'static str = "code";
    const MESSAGE_KEY: &'static str = "message";
    const DOMAIN_KEY: &'static str = "domain";

    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Encodes the error as a payload dictionary tagged with [`ERROR_DOMAIN`].
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::with_capacity(3);
        dict.insert(Self::DOMAIN_KEY, ERROR_DOMAIN);
        dict.insert(Self::CODE_KEY, self.code.as_str());
        dict.insert(Self::MESSAGE_KEY, self.message.as_str());
        dict
    }

    /// Decodes an error written by [`RemoteError::to_dictionary`].
    ///
    /// Returns `None` when the code is missing or unknown, or when the
    /// dictionary names a domain other than [`ERROR_DOMAIN`]. A missing domain
    /// is accepted and a missing message decodes as an empty string.
    pub fn from_dictionary(dict: &Dictionary) -> Option<Self> {
        if let Some(domain) = dict.get(Self::DOMAIN_KEY)
            && domain.as_str() != Some(ERROR_DOMAIN)
        {
            return None;
        }
        let code = dict
            .get(Self::CODE_KEY)
            .and_then(Value::as_str)
            .and_then(ErrorCode::from_name)?;
        let message = dict
            .get(Self::MESSAGE_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(code, message))
    }
}

impl From<&MessageError> for RemoteError {
    fn from(err: &MessageError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for RemoteError {}
