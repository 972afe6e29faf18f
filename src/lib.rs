//! Flowstat - engine flow statistics exporter for Prometheus.
//!
//! Flowstat subscribes to the integration engine's statistics WebSocket,
//! folds accounting and resource reports into a canonical metric table and
//! serves that table on a Prometheus scrape endpoint.
//!
//! # Features
//!
//! - **Streaming ingest**: one auto-reconnecting subscription, optional mutual TLS
//! - **Backpressure**: a bounded envelope queue stalls the socket when aggregation lags
//! - **Interval semantics**: counters reset on scrape, extrema and gauges persist
//! - **Consistent scrapes**: every scrape reads one coherent snapshot
//!
//! # Architecture
//!
//! - `receiver`: statistics stream reader and frame decoding
//! - `metrics`: catalog, translation, canonical table and aggregator actor
//! - `export`: Prometheus registry bridge
//! - `api`: HTTP scrape endpoint
//! - `core`: configuration, errors and retry policy
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use flowstat::core::Config;
//! use flowstat::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod application;
pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod monitoring;
pub mod receiver;

// Re-export core types for convenience
pub use crate::application::Application;
pub use crate::core::{Config, Result};
