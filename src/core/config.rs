//! Configuration management for flowstat.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (see `cli`)
//! - Validation and defaults

use crate::core::retry::RetryConfig;
use crate::core::{FlowstatError, Result};
use crate::metrics::catalog;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Uri;

/// Default engine statistics endpoint
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:7600/apiv2/statistics";

/// Default port of the scrape endpoint
pub const DEFAULT_METRICS_PORT: u16 = 9483;

/// Default metric namespace prefix
pub const DEFAULT_NAMESPACE: &str = "ibmace";

/// Complete configuration for flowstat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Statistics stream configuration
    pub stream: StreamConfig,
    /// Scrape endpoint configuration
    pub exporter: ExporterConfig,
    /// Metric catalog configuration
    pub catalog: CatalogConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Statistics stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket URL of the engine statistics feed
    pub url: String,
    /// How long a single read may idle before the stop flag is rechecked
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Capacity of the envelope queue between reader and aggregator
    pub queue_capacity: usize,
    /// Reconnect backoff
    pub reconnect: RetryConfig,
    /// Mutual TLS material
    pub tls: TlsConfig,
}

/// Mutual TLS configuration for the statistics connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS on the statistics connection
    pub enabled: bool,
    /// CA bundle used to verify the engine
    pub ca_file: Option<PathBuf>,
    /// Client certificate chain presented to the engine
    pub cert_file: Option<PathBuf>,
    /// Client private key
    pub key_file: Option<PathBuf>,
    /// Overrides the server name used for verification and SNI
    pub server_name: Option<String>,
}

/// Scrape endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Whether the metrics pipeline runs at all
    pub enabled: bool,
    /// Bind address for the HTTP endpoint
    pub bind_address: IpAddr,
    /// HTTP port
    pub port: u16,
    /// Prefix for every exported metric name
    pub namespace: String,
    /// Upper bound on a snapshot round-trip
    #[serde(with = "humantime_serde")]
    pub snapshot_timeout: Duration,
}

/// Metric catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog names that are never collected or exported
    pub disabled: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format (targets, thread ids, line numbers)
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            url: DEFAULT_STREAM_URL.to_string(),
            read_timeout: Duration::from_secs(30),
            queue_capacity: 10,
            reconnect: RetryConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Where the statistics stream connects, derived from [`StreamConfig::url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl StreamConfig {
    /// Parse the stream url into host, port and scheme.
    ///
    /// The url must use `ws://` or `wss://` and name a host.
    pub fn endpoint(&self) -> Result<StreamEndpoint> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e| FlowstatError::config(format!("invalid stream url '{}': {}", self.url, e)))?;

        let secure = match uri.scheme_str() {
            Some("ws") => false,
            Some("wss") => true,
            _ => {
                return Err(FlowstatError::config(format!(
                    "stream url must use ws:// or wss://, got '{}'",
                    self.url
                )))
            },
        };

        let host = uri.host().unwrap_or_default().trim_matches(|c| c == '[' || c == ']');
        if host.is_empty() {
            return Err(FlowstatError::config(format!("stream url '{}' has no host", self.url)));
        }

        Ok(StreamEndpoint {
            host: host.to_string(),
            port: uri.port_u16().unwrap_or(if secure { 443 } else { 80 }),
            secure,
        })
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            enabled: true,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_METRICS_PORT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            snapshot_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;

        if stream.endpoint()?.secure && !stream.tls.enabled {
            return Err(FlowstatError::config("wss:// stream url requires tls.enabled"));
        }

        if stream.queue_capacity == 0 {
            return Err(FlowstatError::config("queue_capacity must be greater than 0"));
        }

        if stream.read_timeout.is_zero() {
            return Err(FlowstatError::config("read_timeout must be greater than 0"));
        }

        let reconnect = &stream.reconnect;
        if reconnect.multiplier < 1.0 {
            return Err(FlowstatError::config(format!(
                "reconnect multiplier must be at least 1.0, got {}",
                reconnect.multiplier
            )));
        }
        if reconnect.initial_backoff > reconnect.max_backoff {
            return Err(FlowstatError::config(
                "reconnect initial_backoff must not exceed max_backoff",
            ));
        }

        if stream.tls.enabled {
            let tls = &stream.tls;
            for (name, path) in [
                ("ca_file", &tls.ca_file),
                ("cert_file", &tls.cert_file),
                ("key_file", &tls.key_file),
            ] {
                if path.is_none() {
                    return Err(FlowstatError::config(format!("tls.enabled requires tls.{}", name)));
                }
            }
        }

        if self.exporter.port == 0 {
            return Err(FlowstatError::config("exporter port must be greater than 0"));
        }

        if self.exporter.snapshot_timeout.is_zero() {
            return Err(FlowstatError::config("snapshot_timeout must be greater than 0"));
        }

        if self.exporter.namespace.is_empty() {
            return Err(FlowstatError::config("namespace must not be empty"));
        }

        for name in &self.catalog.disabled {
            if !catalog::is_known(name) {
                return Err(FlowstatError::config(format!(
                    "Cannot disable unknown metric '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| FlowstatError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the statistics stream URL
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.config.stream.url = url.into();
        self
    }

    /// Set the envelope queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.stream.queue_capacity = capacity;
        self
    }

    /// Set the scrape port
    pub fn port(mut self, port: u16) -> Self {
        self.config.exporter.port = port;
        self
    }

    /// Enable or disable the whole pipeline
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.exporter.enabled = enabled;
        self
    }

    /// Enable TLS with the given CA, certificate and key files
    pub fn tls(mut self, ca_file: PathBuf, cert_file: PathBuf, key_file: PathBuf) -> Self {
        let tls = &mut self.config.stream.tls;
        tls.enabled = true;
        tls.ca_file = Some(ca_file);
        tls.cert_file = Some(cert_file);
        tls.key_file = Some(key_file);
        self
    }

    /// Override the TLS server name
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream.tls.server_name = Some(name.into());
        self
    }

    /// Disable a catalog metric by name
    pub fn disable_metric(mut self, name: impl Into<String>) -> Self {
        self.config.catalog.disabled.push(name.into());
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.queue_capacity, 10);
        assert_eq!(config.exporter.port, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_tls_requires_material() {
        let mut config = Config::default();
        config.stream.tls.enabled = true;
        assert!(config.validate().is_err());

        config.stream.tls.ca_file = Some(PathBuf::from("ca.crt"));
        config.stream.tls.cert_file = Some(PathBuf::from("tls.crt"));
        assert!(config.validate().is_err());

        config.stream.tls.key_file = Some(PathBuf::from("tls.key"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wss_requires_tls() {
        let config = ConfigBuilder::new()
            .stream_url("wss://localhost:7600/apiv2/statistics")
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let config = ConfigBuilder::new().stream_url("http://localhost:7600").build();
        assert!(config.is_err());
    }

    #[test]
    fn test_rejects_url_without_host() {
        for url in ["ws://", "ws://:7600/apiv2/statistics", "ws://exa mple/apiv2/statistics", "ws:/engine"] {
            let config = ConfigBuilder::new().stream_url(url).build();
            assert!(config.is_err(), "accepted '{}'", url);
        }
    }

    #[test]
    fn test_endpoint_defaults_port_by_scheme() {
        let mut stream = StreamConfig::default();
        stream.url = "ws://engine/apiv2/statistics".to_string();
        assert_eq!(
            stream.endpoint().unwrap(),
            StreamEndpoint {
                host: "engine".to_string(),
                port: 80,
                secure: false
            }
        );

        stream.url = "wss://[::1]:7843/apiv2/statistics".to_string();
        let endpoint = stream.endpoint().unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 7843);
        assert!(endpoint.secure);
    }

    #[test]
    fn test_zero_queue_capacity() {
        assert!(ConfigBuilder::new().queue_capacity(0).build().is_err());
    }

    #[test]
    fn test_unknown_disabled_metric() {
        assert!(ConfigBuilder::new().disable_metric("no_such_metric").build().is_err());
        assert!(ConfigBuilder::new()
            .disable_metric("msgflow_commits_total")
            .build()
            .is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
stream:
  url: "ws://engine:7600/apiv2/statistics"
  read_timeout: 10s
  queue_capacity: 32
  reconnect:
    initial_backoff: 50ms
    max_backoff: 2s
exporter:
  port: 9999
  namespace: engine
  snapshot_timeout: 1s
catalog:
  disabled:
    - jvm_gc_collections_total
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.stream.url, "ws://engine:7600/apiv2/statistics");
        assert_eq!(config.stream.read_timeout, Duration::from_secs(10));
        assert_eq!(config.stream.queue_capacity, 32);
        assert_eq!(config.stream.reconnect.initial_backoff, Duration::from_millis(50));
        assert!(config.stream.reconnect.jitter);
        assert_eq!(config.exporter.port, 9999);
        assert_eq!(config.exporter.namespace, "engine");
        assert_eq!(config.catalog.disabled, vec!["jvm_gc_collections_total".to_string()]);
        assert_eq!(config.logging.level.as_str(), "debug");
    }
}
