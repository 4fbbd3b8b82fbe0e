//! Endpoints that exchange postbox messages over a transport.
//!
//! This crate provides:
//! - The [`Transport`] trait and an in-process [`LocalTransport`] pair
//! - [`Endpoint`], which answers incoming invocations and correlates
//!   replies to outstanding requests
//! - [`EndpointConfig`], loadable from TOML
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use postbox_protocol::{CapabilityTable, Value};
//! use postbox_service::{Endpoint, EndpointConfig, LocalTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut table = CapabilityTable::new();
//!     table.register("targetA", "ping", |_| Ok(Some(Value::from("pong"))));
//!     let table = Arc::new(table);
//!
//!     let (left, right) = LocalTransport::pair(64);
//!     let client = Endpoint::start(EndpointConfig::new("client"), left, table.clone())?;
//!     let _service = Endpoint::start(EndpointConfig::new("service"), right, table)?;
//!
//!     let pong = client.invoke_remote("targetA", "ping", None).await?;
//!     assert_eq!(pong, Some(Value::from("pong")));
//!     Ok(())
//! }
//! ```

mod config;
mod endpoint;
mod error;
mod handler;
mod local;
mod pending;
mod transport;

pub use config::EndpointConfig;
pub use endpoint::Endpoint;
pub use error::{ServiceError, ServiceResult};
pub use handler::InvocationHandler;
pub use local::LocalTransport;
pub use pending::{PendingReplies, ReplyOutcome};
pub use transport::{ErrorCallback, ReceiveCallback, Transport};
