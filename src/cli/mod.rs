//! Command-line interface for flowstat.
//!
//! Run `flowstat` with no arguments to subscribe to the local engine feed
//! and serve metrics on port 9483.

use crate::application::Application;
use crate::core::{Config, ConfigBuilder, FlowstatError, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;

/// Streams engine flow statistics and serves them to Prometheus
#[derive(Parser, Debug)]
#[command(name = "flowstat")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/flowstat/config.yaml)
    #[arg(short, long, env = "FLOWSTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// WebSocket URL of the statistics feed
    #[arg(long, env = "FLOWSTAT_STREAM_URL")]
    pub stream_url: Option<String>,

    /// Port of the scrape endpoint
    #[arg(long, env = "FLOWSTAT_METRICS_PORT")]
    pub port: Option<u16>,

    /// Turn the whole pipeline on or off (true/false, yes/no, 1/0)
    #[arg(long, env = "FLOWSTAT_METRICS_ENABLED", value_parser = BoolishValueParser::new())]
    pub enabled: Option<bool>,

    /// CA certificate used to verify the engine
    #[arg(long, env = "FLOWSTAT_TLS_CA", requires_all = ["tls_cert", "tls_key"])]
    pub tls_ca: Option<PathBuf>,

    /// Client certificate presented to the engine
    #[arg(long, env = "FLOWSTAT_TLS_CERT", requires_all = ["tls_ca", "tls_key"])]
    pub tls_cert: Option<PathBuf>,

    /// Client private key
    #[arg(long, env = "FLOWSTAT_TLS_KEY", requires_all = ["tls_ca", "tls_cert"])]
    pub tls_key: Option<PathBuf>,

    /// Name to verify the engine certificate against
    #[arg(long, env = "FLOWSTAT_SERVER_NAME")]
    pub server_name: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "FLOWSTAT_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Default configuration file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("flowstat").join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/flowstat/config.yaml"))
    }

    /// Load configuration with precedence, highest first:
    /// 1. CLI arguments and `FLOWSTAT_*` environment variables
    /// 2. Config file
    /// 3. Defaults
    ///
    /// Returns the config file that was read, if any.
    pub async fn load_config(&self) -> Result<(Config, Option<PathBuf>)> {
        let mut builder = ConfigBuilder::new();

        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => Some(Self::default_config_path()).filter(|p| p.exists()),
        };

        let mut loaded = None;
        if let Some(path) = path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    loaded = Some(path);
                },
                Err(e) if self.config.is_some() => {
                    return Err(FlowstatError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(_) => {},
            }
        }

        Ok((self.apply_overrides(builder)?, loaded))
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(url) = &self.stream_url {
            builder = builder.stream_url(url.clone());
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(enabled) = self.enabled {
            builder = builder.enabled(enabled);
        }
        if let (Some(ca), Some(cert), Some(key)) = (&self.tls_ca, &self.tls_cert, &self.tls_key) {
            builder = builder.tls(ca.clone(), cert.clone(), key.clone());
        }
        if let Some(name) = &self.server_name {
            builder = builder.server_name(name.clone());
        }
        if self.debug {
            builder = builder.debug(true);
        }

        builder.build()
    }

    /// Initialize logging.
    ///
    /// Level precedence: `--debug`, then `FLOWSTAT_LOG_LEVEL`, then `RUST_LOG`,
    /// then `logging.level` from the config.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = if self.debug || config.debug {
            EnvFilter::new("debug")
        } else if let Ok(level) = std::env::var("FLOWSTAT_LOG_LEVEL") {
            EnvFilter::new(level)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()))
        };

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| FlowstatError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute flowstat.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("flowstat {}", env!("CARGO_PKG_VERSION"));
        println!("Engine flow statistics exporter for Prometheus");
        return Ok(());
    }

    let (config, source) = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Stream URL: {}", config.stream.url);
        println!("  TLS: {}", if config.stream.tls.enabled { "enabled" } else { "disabled" });
        println!(
            "  Metrics endpoint: {}:{}",
            config.exporter.bind_address, config.exporter.port
        );
        println!("  Namespace: {}", config.exporter.namespace);
        println!("  Disabled metrics: {}", config.catalog.disabled.len());
        return Ok(());
    }

    cli.init_logging(&config)?;
    match source {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::debug!("No config file found, using defaults"),
    }

    if !config.exporter.enabled {
        tracing::info!("Metrics disabled by configuration, exiting");
        return Ok(());
    }

    tracing::info!("Starting flowstat {}", env!("CARGO_PKG_VERSION"));
    Application::new(config)?.run().await
}
