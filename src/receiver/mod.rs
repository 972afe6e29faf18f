//! Statistics stream reader.
//!
//! Keeps one WebSocket subscription to the engine's statistics feed alive for
//! the lifetime of the process and pushes every decoded frame onto the
//! bounded envelope queue. A full queue blocks the push, which stalls reading
//! from the socket; that is the pipeline's only backpressure.
//!
//! Reconnects are unconditional. Each attempt after a failure waits for an
//! exponential, jittered backoff that resets after a successful connect.

pub mod envelope;
pub mod tls;

use crate::core::config::{StreamConfig, StreamEndpoint};
use crate::core::{Backoff, FlowstatError, Result};
use crate::monitoring::PipelineMetrics;
use envelope::StatEnvelope;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tls::TlsSettings;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Cooperative stop flag shared with the owner of the reader
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Request stop; observed after the next read completes or times out
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why a connected session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    QueueClosed,
}

/// Auto-reconnecting reader of the engine statistics feed
pub struct StreamReader {
    config: StreamConfig,
    tls: Option<TlsSettings>,
    queue: mpsc::Sender<StatEnvelope>,
    stop: StopFlag,
    ready: Option<oneshot::Sender<()>>,
    telemetry: Option<Arc<PipelineMetrics>>,
}

impl StreamReader {
    /// Create a reader feeding `queue`. TLS material is loaded here so that
    /// unreadable files fail startup. The returned receiver fires once, on
    /// the first successful connect.
    pub fn new(config: StreamConfig, queue: mpsc::Sender<StatEnvelope>) -> Result<(Self, oneshot::Receiver<()>)> {
        let tls = if config.tls.enabled {
            Some(TlsSettings::load(&config.tls)?)
        } else {
            None
        };
        let (ready_tx, ready_rx) = oneshot::channel();

        let reader = Self {
            config,
            tls,
            queue,
            stop: StopFlag::default(),
            ready: Some(ready_tx),
            telemetry: None,
        };
        Ok((reader, ready_rx))
    }

    /// Record frames, reconnects and connection state in `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<PipelineMetrics>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Flag that ends the reader after its next read
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Run the connect/read loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect/read loop; returns once stopped or the queue consumer is gone
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.reconnect.clone());
        let mut attempted = false;

        while !self.stop.is_set() {
            if attempted {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.reconnects.inc();
                }
            }
            attempted = true;

            match self.session(&mut backoff).await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::QueueClosed) => {
                    tracing::info!("Envelope queue closed, statistics reader exiting");
                    break;
                },
                Err(e) => tracing::warn!("Statistics stream to {} failed: {}", self.config.url, e),
            }
            self.set_connected(false);

            if self.stop.is_set() {
                break;
            }

            let delay = backoff.next_delay();
            tracing::debug!("Reconnecting in {:?} (attempt {})", delay, backoff.attempts());
            tokio::time::sleep(delay).await;
        }

        self.set_connected(false);
        tracing::info!("Statistics reader stopped");
    }

    async fn session(&mut self, backoff: &mut Backoff) -> Result<SessionEnd> {
        let StreamEndpoint { host, port, .. } = self.config.endpoint()?;

        let tcp = tokio::time::timeout(self.config.read_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| FlowstatError::network(format!("connect to {}:{} timed out", host, port)))??;
        tcp.set_nodelay(true)?;

        match self.tls.clone() {
            Some(tls) => {
                let name = tls.server_name_for(&host)?;
                let stream = tls.connector.connect(name, tcp).await?;
                let (ws, _) = tokio_tungstenite::client_async(self.config.url.as_str(), stream).await?;
                self.connected(backoff);
                self.pump(ws).await
            },
            None => {
                let (ws, _) = tokio_tungstenite::client_async(self.config.url.as_str(), tcp).await?;
                self.connected(backoff);
                self.pump(ws).await
            },
        }
    }

    fn connected(&mut self, backoff: &mut Backoff) {
        tracing::info!("Connected to statistics feed {}", self.config.url);
        backoff.reset();
        self.set_connected(true);

        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
    }

    fn set_connected(&self, connected: bool) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.connected.set(i64::from(connected));
        }
    }

    async fn pump<S>(&mut self, mut ws: WebSocketStream<S>) -> Result<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let read = tokio::time::timeout(self.config.read_timeout, ws.next()).await;

            let message = match read {
                Err(_) => {
                    // Idle feed; only the stop flag ends the session here
                    if self.stop.is_set() {
                        let _ = ws.close(None).await;
                        return Ok(SessionEnd::Stopped);
                    }
                    continue;
                },
                Ok(None) => return Err(FlowstatError::network("statistics stream ended")),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            let delivered = match message {
                Message::Text(text) => self.deliver(&text).await,
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.deliver(text).await,
                    Err(_) => {
                        self.reject("binary frame is not UTF-8");
                        true
                    },
                },
                Message::Close(frame) => {
                    return Err(FlowstatError::network(format!("engine closed the stream: {:?}", frame)));
                },
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => true,
            };

            if !delivered {
                return Ok(SessionEnd::QueueClosed);
            }
            if self.stop.is_set() {
                let _ = ws.close(None).await;
                return Ok(SessionEnd::Stopped);
            }
        }
    }

    /// Decode and enqueue one frame; false once the queue is closed
    async fn deliver(&self, text: &str) -> bool {
        if let Some(telemetry) = &self.telemetry {
            telemetry.frames_received.inc();
        }

        match StatEnvelope::decode(text) {
            Ok(envelope) => {
                tracing::debug!("Received {} statistics frame", envelope.kind());
                self.queue.send(envelope).await.is_ok()
            },
            Err(e) => {
                self.reject(&e.to_string());
                true
            },
        }
    }

    fn reject(&self, reason: &str) {
        tracing::warn!("Dropping statistics frame: {}", reason);
        if let Some(telemetry) = &self.telemetry {
            telemetry.frames_rejected.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StreamConfig;

    #[test]
    fn test_stop_flag_shared() {
        let flag = StopFlag::default();
        let clone = flag.clone();
        assert!(!flag.is_set());
        clone.set();
        assert!(flag.is_set());
    }

    #[tokio::test]
    async fn test_new_without_tls() {
        let (tx, _rx) = mpsc::channel(10);
        let (reader, _ready) = StreamReader::new(StreamConfig::default(), tx).unwrap();
        assert!(reader.tls.is_none());
        assert!(!reader.stop_flag().is_set());
    }

    #[tokio::test]
    async fn test_new_with_unreadable_tls_fails() {
        let mut config = StreamConfig::default();
        config.tls.enabled = true;
        config.tls.ca_file = Some("/nonexistent/ca.crt".into());
        config.tls.cert_file = Some("/nonexistent/tls.crt".into());
        config.tls.key_file = Some("/nonexistent/tls.key".into());

        let (tx, _rx) = mpsc::channel(10);
        assert!(StreamReader::new(config, tx).is_err());
    }

    #[tokio::test]
    async fn test_deliver_counts_rejects() {
        let (tx, mut rx) = mpsc::channel(10);
        let telemetry = Arc::new(PipelineMetrics::new("test").unwrap());
        let (reader, _ready) = StreamReader::new(StreamConfig::default(), tx).unwrap();
        let reader = reader.with_telemetry(Arc::clone(&telemetry));

        assert!(reader.deliver("garbage").await);
        assert!(reader.deliver(r#"{"event":1,"data":{"ResourceStatistics":{}}}"#).await);

        assert_eq!(telemetry.frames_received.get(), 2);
        assert_eq!(telemetry.frames_rejected.get(), 1);
        assert_eq!(rx.recv().await.unwrap().kind(), "resource");
    }

    #[tokio::test]
    async fn test_deliver_reports_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (reader, _ready) = StreamReader::new(StreamConfig::default(), tx).unwrap();
        assert!(!reader.deliver(r#"{"event":1,"data":{"ResourceStatistics":{}}}"#).await);
    }
}
