//! Core types: tagged payload values, dictionaries, tracing setup

pub mod tracing;
pub mod value;

pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat, LOG_TARGET};
pub use value::{Dictionary, Value, ValueKind};

/// Re-exported so callers can build [`Value::Url`] without a direct dependency.
pub use url::Url;
