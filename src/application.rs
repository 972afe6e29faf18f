//! Main application entry point for flowstat.

use crate::api::{self, ApiState};
use crate::core::{Config, FlowstatError, Result};
use crate::export::MetricsExporter;
use crate::metrics::{Aggregator, Catalog};
use crate::monitoring::PipelineMetrics;
use crate::receiver::StreamReader;
use prometheus::Registry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Main application struct that wires the pipeline together:
/// stream reader → envelope queue → aggregator ⇄ exporter → HTTP.
pub struct Application {
    config: Config,
}

impl Application {
    /// Create a new Application with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.config;
        if !config.exporter.enabled {
            tracing::info!("Metrics pipeline disabled, nothing to do");
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = shutdown_tx.send(true);
        });

        let namespace = config.exporter.namespace.as_str();
        let registry = Registry::new();
        let telemetry = Arc::new(PipelineMetrics::new(namespace)?);
        telemetry.register(&registry)?;

        let catalog = Arc::new(Catalog::with_disabled(&config.catalog.disabled));
        let (queue_tx, queue_rx) = mpsc::channel(config.stream.queue_capacity);

        let (aggregator, handle) = Aggregator::new(catalog, queue_rx);
        let aggregator_task = aggregator.with_telemetry(Arc::clone(&telemetry)).spawn();

        let (reader, ready) = match StreamReader::new(config.stream.clone(), queue_tx) {
            Ok(pair) => pair,
            Err(e) => {
                handle.stop();
                return Err(e);
            },
        };
        let stop_reader = reader.stop_flag();
        let reader_task = reader.with_telemetry(Arc::clone(&telemetry)).spawn();

        tracing::info!("Waiting for statistics feed at {}", config.stream.url);
        let served = tokio::select! {
            connected = ready => match connected {
                Ok(()) => {
                    let state = async {
                        let exporter = MetricsExporter::describe(
                            handle.clone(),
                            registry,
                            namespace,
                            config.exporter.snapshot_timeout,
                        )
                        .await?
                        .with_telemetry(Arc::clone(&telemetry));
                        Ok::<_, FlowstatError>(ApiState {
                            exporter: Arc::new(exporter),
                            telemetry: Arc::clone(&telemetry),
                        })
                    };
                    match state.await {
                        Ok(state) => {
                            let addr = SocketAddr::new(config.exporter.bind_address, config.exporter.port);
                            match api::bind(addr).await {
                                Ok(listener) => {
                                    let mut rx = shutdown_rx.clone();
                                    api::serve(listener, api::router(state), async move {
                                        wait_for(&mut rx).await;
                                    })
                                    .await
                                },
                                Err(e) => Err(e),
                            }
                        },
                        Err(e) => Err(e),
                    }
                },
                Err(_) => Err(FlowstatError::network("statistics reader exited before connecting")),
            },
            _ = wait_for(&mut shutdown_rx) => {
                tracing::info!("Shutdown requested before the statistics feed connected");
                Ok(())
            },
        };

        tracing::info!("Stopping metrics pipeline");
        stop_reader.set();
        handle.stop();

        if let Err(e) = aggregator_task.await {
            tracing::error!("Aggregator task failed: {}", e);
        }

        // An in-flight read is never cancelled; give it one read timeout.
        let grace = config.stream.read_timeout;
        if tokio::time::timeout(grace, reader_task).await.is_err() {
            tracing::warn!("Statistics reader still blocked after {:?}, leaving it behind", grace);
        }

        served
    }
}

async fn wait_for(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigBuilder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disabled_pipeline_returns_immediately() {
        let config = ConfigBuilder::new().enabled(false).build().unwrap();
        let app = Application::new(config).unwrap();
        app.run_until(std::future::pending()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        // Nothing listens on this port; the reader keeps retrying until shutdown
        let mut config = ConfigBuilder::new()
            .stream_url("ws://127.0.0.1:9/apiv2/statistics")
            .build()
            .unwrap();
        config.stream.read_timeout = Duration::from_millis(200);

        let app = Application::new(config).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            app.run_until(tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_tls_is_fatal() {
        let config = ConfigBuilder::new()
            .tls("/nonexistent/ca.crt".into(), "/nonexistent/tls.crt".into(), "/nonexistent/tls.key".into())
            .build()
            .unwrap();

        let app = Application::new(config).unwrap();
        let err = app.run_until(std::future::pending()).await.unwrap_err();
        assert_eq!(err.category(), "tls");
    }
}
