//! Core configuration, error and retry types shared by the pipeline.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{FlowstatError, Result};
pub use retry::{Backoff, RetryConfig};
