//! Configuration management for Hivegate.
//!
//! Configuration is read once at startup into immutable values. Missing
//! options take the defaults below; [`GateConfig::validate`] rejects anything
//! the gate cannot run with before the first request is seen.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};
use crate::ratelimit::{Algorithm, Limit, DEFAULT_KEY_PREFIX};

/// Message sent with a rejection when none is configured.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Main configuration for the Hivegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HivegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Gate configuration
    #[serde(default)]
    pub gate: GateConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Redis URL for the shared counter store; in-memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// How often the in-memory store sweeps expired entries, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_purge_interval() -> u64 {
    60
}

/// Gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Requests permitted per period
    #[serde(default = "default_max")]
    pub max: u64,

    /// Instantaneous allowance (GCRA)
    #[serde(default = "default_burst")]
    pub burst: u64,

    /// Period over which `max` applies, in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Counting strategy
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Namespace for every rate key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Status code of a rejection
    #[serde(default = "default_status_code")]
    pub status_code: u16,

    /// Body of a rejection
    #[serde(default = "default_message")]
    pub message: String,

    /// Let requests through when the counter store fails
    #[serde(default)]
    pub skip_on_error: bool,

    /// Give up on the counter store after this many milliseconds
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max: default_max(),
            burst: default_burst(),
            period_ms: default_period_ms(),
            algorithm: Algorithm::default(),
            key_prefix: default_key_prefix(),
            status_code: default_status_code(),
            message: default_message(),
            skip_on_error: false,
            store_timeout_ms: None,
        }
    }
}

fn default_max() -> u64 {
    10
}

fn default_burst() -> u64 {
    10
}

fn default_period_ms() -> u64 {
    60_000
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_status_code() -> u16 {
    StatusCode::TOO_MANY_REQUESTS.as_u16()
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

impl GateConfig {
    pub fn with_max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period_ms = crate::clock::duration_millis(period);
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_skip_on_error(mut self, skip: bool) -> Self {
        self.skip_on_error = skip;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_ms = Some(crate::clock::duration_millis(timeout));
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }

    /// The rejection status code.
    pub fn status(&self) -> Result<StatusCode> {
        StatusCode::from_u16(self.status_code)
            .map_err(|_| GateError::Config(format!("invalid status code {}", self.status_code)))
    }

    /// The limit every request through the gate is checked against.
    pub fn limit(&self) -> Result<Limit> {
        Limit::new(self.max, self.burst, self.period(), self.algorithm)
    }

    /// Check that the configuration describes a runnable gate.
    pub fn validate(&self) -> Result<()> {
        self.limit()?;
        self.status()?;
        if self.key_prefix.is_empty() {
            return Err(GateError::Config("key_prefix must not be empty".to_string()));
        }
        if self.store_timeout_ms == Some(0) {
            return Err(GateError::Config(
                "store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl HivegateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file, then apply `HIVEGATE__*`
    /// environment overrides (e.g. `HIVEGATE__GATE__MAX=20`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("HIVEGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| GateError::Config(format!("Failed to load configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.max, 10);
        assert_eq!(config.burst, 10);
        assert_eq!(config.period(), Duration::from_secs(60));
        assert_eq!(config.algorithm, Algorithm::SlidingWindow);
        assert_eq!(config.key_prefix, "hivegate");
        assert_eq!(config.status().unwrap(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(config.message, DEFAULT_MESSAGE);
        assert!(!config.skip_on_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml_fills_defaults() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:8080"
gate:
  max: 3
  burst: 3
  period_ms: 10000
  algorithm: gcra
"#;
        let config = HivegateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.redis_url, None);
        assert_eq!(config.gate.max, 3);
        assert_eq!(config.gate.algorithm, Algorithm::Gcra);
        assert_eq!(config.gate.message, DEFAULT_MESSAGE);

        let limit = config.gate.limit().unwrap();
        assert_eq!(limit.emission_interval_nanos(), 3_333_333_334);
    }

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config = HivegateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.gate, GateConfig::default());
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = HivegateConfig::from_yaml("gate: [").unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(GateConfig::default().with_max(0).validate().is_err());
        assert!(GateConfig::default().with_burst(0).validate().is_err());
        assert!(GateConfig::default()
            .with_period(Duration::ZERO)
            .validate()
            .is_err());
        assert!(GateConfig::default().with_key_prefix("").validate().is_err());

        let config = GateConfig {
            status_code: 42,
            ..GateConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GateConfig {
            store_timeout_ms: Some(0),
            ..GateConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = GateConfig::default()
            .with_max(100)
            .with_burst(20)
            .with_period(Duration::from_secs(1))
            .with_algorithm(Algorithm::Gcra)
            .with_key_prefix("api")
            .with_skip_on_error(true)
            .with_store_timeout(Duration::from_millis(50));

        assert_eq!(config.max, 100);
        assert_eq!(config.burst, 20);
        assert_eq!(config.period_ms, 1_000);
        assert_eq!(config.key_prefix, "api");
        assert!(config.skip_on_error);
        assert_eq!(config.store_timeout(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_from_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
server:
  redis_url: "redis://cache:6379"
gate:
  max: 5
  skip_on_error: true
"#,
        )
        .unwrap();

        let config = HivegateConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.gate.max, 5);
        assert!(config.gate.skip_on_error);
        assert_eq!(config.gate.burst, 10);
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HivegateConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, GateError::Io(_)));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HivegateConfig::load(None).unwrap();
        assert!(config.gate.validate().is_ok());
    }
}
