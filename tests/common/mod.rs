//! Common test utilities and fixtures.

#![allow(dead_code)]

use futures::SinkExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use flowstat::core::config::StreamConfig;
use flowstat::core::RetryConfig;

enum ServerCommand {
    Frame(String),
    Drop,
}

/// Fake engine statistics feed.
///
/// Serves one client at a time; frames queued while no client is connected
/// go to the next one.
pub struct StatsServer {
    pub url: String,
    commands: mpsc::UnboundedSender<ServerCommand>,
    connections: Arc<AtomicUsize>,
}

impl StatsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                loop {
                    match rx.recv().await {
                        Some(ServerCommand::Frame(text)) => {
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        },
                        Some(ServerCommand::Drop) => break,
                        None => return,
                    }
                }
            }
        });

        Self {
            url: format!("ws://{}/apiv2/statistics", addr),
            commands: tx,
            connections,
        }
    }

    pub fn send(&self, frame: Value) {
        self.send_raw(frame.to_string());
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Frame(text.into()));
    }

    /// Drop the current connection without a close handshake
    pub fn drop_connection(&self) {
        let _ = self.commands.send(ServerCommand::Drop);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Stream config pointed at `url` with short timeouts
pub fn stream_config(url: &str, queue_capacity: usize) -> StreamConfig {
    StreamConfig {
        url: url.to_string(),
        read_timeout: Duration::from_millis(100),
        queue_capacity,
        reconnect: RetryConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: false,
        },
        ..StreamConfig::default()
    }
}

/// Accounting frame for flow `flow` on server `is`, application `app`
pub fn accounting_frame(flow: &str, stats: Value, nodes: Value) -> Value {
    let mut message_flow = json!({
        "ExecutionGroupName": "is",
        "ApplicationName": "app",
        "MessageFlowName": flow,
    });
    if let (Some(target), Some(extra)) = (message_flow.as_object_mut(), stats.as_object()) {
        target.extend(extra.clone());
    }

    json!({
        "event": 0,
        "data": {
            "WMQIStatisticsAccounting": {
                "MessageFlow": message_flow,
                "Nodes": nodes,
            }
        }
    })
}

/// Resource frame with a JVM summary for server `is`
pub fn jvm_frame(used_mb: i64, gc_seconds: i64) -> Value {
    json!({
        "event": 1,
        "data": {
            "ResourceStatistics": {
                "executionGroupName": "is",
                "ResourceType": [
                    {
                        "name": "JVM",
                        "resourceIdentifier": [
                            {
                                "name": "summary",
                                "UsedMemoryInMB": used_mb,
                                "CumulativeGCTimeInSeconds": gc_seconds
                            },
                            { "name": "Heap Memory", "UsedMemoryInMB": 999 }
                        ]
                    },
                    { "name": "Threads", "resourceIdentifier": [] }
                ]
            }
        }
    })
}

/// Poll `check` every 10ms until it returns true or `within` elapses
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
