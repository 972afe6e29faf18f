use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowstatError {
    #[error("Statistics protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Translation error: {0}")]
    Translate(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid sample value {value} for metric {metric}")]
    InvalidValue { metric: String, value: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Prometheus registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelReceive,

    #[error("Aggregator has stopped")]
    AggregatorStopped,

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for flowstat operations
pub type Result<T> = std::result::Result<T, FlowstatError>;

impl FlowstatError {
    /// Creates a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new translation error
    pub fn translate<S: Into<String>>(msg: S) -> Self {
        Self::Translate(msg.into())
    }

    /// Creates a new TLS error
    pub fn tls<S: Into<String>>(msg: S) -> Self {
        Self::Tls(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::WebSocket(_) | Self::Io(_) => true,
            Self::Timeout { .. } => true,
            Self::ChannelSend | Self::ChannelReceive => true,
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Protocol(_) | Self::Serialization(_) => "protocol",
            Self::Config(_) => "config",
            Self::Translate(_) | Self::UnknownMetric(_) | Self::InvalidValue { .. } => "translate",
            Self::Tls(_) => "tls",
            Self::Io(_) => "io",
            Self::WebSocket(_) | Self::Network(_) => "network",
            Self::Registry(_) => "registry",
            Self::Join(_) => "async",
            Self::ChannelSend | Self::ChannelReceive => "channel",
            Self::AggregatorStopped => "aggregator",
            Self::Timeout { .. } => "timeout",
        }
    }
}
