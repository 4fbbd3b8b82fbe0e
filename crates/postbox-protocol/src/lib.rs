//! Message envelope and invocation layer for postbox.
//!
//! # Envelope Structure
//!
//! Every message exchanged between two endpoints is a [`Message`]:
//! - `id`: per-instance UUID
//! - `correlation`: token linking a reply to the request awaiting it
//! - `payload`: string-keyed [`Dictionary`] of tagged [`Value`]s
//! - `invocation`: optional (target, method, argument) call description
//!
//! # Invocation
//!
//! A message built with [`Message::with_invocation`] can perform its call
//! through any [`Dispatcher`]; the usual one is a [`CapabilityTable`] filled
//! with closures ahead of time. The result comes back as a reply message
//! whose correlation token matches the request.
//!
//! # Example
//!
//! ```rust
//! use postbox_protocol::{CapabilityTable, Message, Value, RESULT_KEY};
//!
//! let mut table = CapabilityTable::new();
//! table.register("targetA", "ping", |_| Ok(Some(Value::from("pong"))));
//!
//! let request = Message::with_invocation("targetA", "ping", None);
//! let reply = request.invoke(&table).unwrap();
//!
//! assert_eq!(reply.get_string(RESULT_KEY), "pong");
//! assert_eq!(reply.correlation(), Some(&request.reply_token()));
//! ```

mod dispatch;
mod error;
mod invocation;
mod message;
mod types;

pub use dispatch::{CapabilityTable, DispatchError, DispatchResult, Dispatcher};
pub use error::{BoxError, ConnectionError, ERROR_DOMAIN, MessageError, MessageResult};
pub use invocation::{InvocationSpec, MethodId, TargetRef};
pub use message::{FromValue, Message};
pub use types::{CorrelationToken, ErrorCode, MessageId, RemoteError};

pub use postbox_core::{Dictionary, Url, Value, ValueKind};

/// Payload key holding an invocation's target.
pub const TARGET_KEY: &str = "target";

/// Payload key holding an invocation's method.
pub const METHOD_KEY: &str = "method";

/// Payload key holding an invocation's argument.
pub const ARGUMENT_KEY: &str = "argument";

/// Payload key under which a reply stores the invocation result.
pub const RESULT_KEY: &str = "result";

/// Payload key under which an error reply stores its [`RemoteError`].
pub const ERROR_KEY: &str = "error";

/// Terminator for [`Message::from_variadic_pairs`].
pub const SENTINEL: Value = Value::Null;
