//! Endpoint configuration.
//!
//! Loaded from a TOML file or built in code:
//!
//! ```toml
//! name = "indexer"
//! request_timeout_ms = 5000
//! invoke_timeout_ms = 2000
//! channel_capacity = 128
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Name used in log output.
    pub name: String,

    /// How long `request` waits for the correlated reply.
    pub request_timeout_ms: u64,

    /// How long an incoming invocation may run before it is reported as failed.
    pub invoke_timeout_ms: u64,

    /// Capacity of the inbox holding plain data messages. Transport queues are
    /// sized by the transport itself, e.g. [`crate::LocalTransport::pair`].
    pub channel_capacity: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "postbox".to_string(),
            request_timeout_ms: 30_000,
            invoke_timeout_ms: 30_000,
            channel_capacity: 64,
        }
    }
}

impl EndpointConfig {
    /// Creates a default configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parses a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(content: &str) -> ServiceResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rejects zero timeouts and a zero channel capacity.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ServiceError::config("request_timeout_ms must be positive"));
        }
        if self.invoke_timeout_ms == 0 {
            return Err(ServiceError::config("invoke_timeout_ms must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(ServiceError::config("channel_capacity must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    /// Builder: set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Builder: set invocation timeout.
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Builder: set channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/// Whole milliseconds, rounded up so a positive duration never becomes zero.
fn millis_ceil(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config() {
        let config = EndpointConfig::default();
        assert_eq!(config.name, "postbox");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.invoke_timeout(), Duration::from_secs(30));
        assert_eq!(config.channel_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder() {
        let config = EndpointConfig::new("worker")
            .with_request_timeout(Duration::from_millis(250))
            .with_invoke_timeout(Duration::from_secs(2))
            .with_channel_capacity(8);

        assert_eq!(config.name, "worker");
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.invoke_timeout(), Duration::from_secs(2));
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn sub_millisecond_timeouts_round_up() {
        let config = EndpointConfig::default()
            .with_request_timeout(Duration::from_micros(10))
            .with_invoke_timeout(Duration::from_micros(1500));

        assert_eq!(config.request_timeout_ms, 1);
        assert_eq!(config.invoke_timeout_ms, 2);
        assert!(config.validate().is_ok());

        let config = EndpointConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EndpointConfig::from_toml_str("name = \"indexer\"\ninvoke_timeout_ms = 500\n")
            .unwrap();
        assert_eq!(config.name, "indexer");
        assert_eq!(config.invoke_timeout_ms, 500);
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn invalid_values_rejected() {
        let err = EndpointConfig::from_toml_str("channel_capacity = 0").unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));

        let err = EndpointConfig::from_toml_str("request_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ServiceError::ConfigParse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("endpoint.toml");
        std::fs::write(&path, "name = \"from-file\"\nchannel_capacity = 4\n").unwrap();

        let config = EndpointConfig::load_from(&path).unwrap();
        assert_eq!(config.name, "from-file");
        assert_eq!(config.channel_capacity, 4);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = EndpointConfig::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
    }
}
