//! The aggregator actor.
//!
//! A single task owns the canonical [`MetricTable`] and processes one event
//! at a time: envelopes from the stream reader (translated inline), batches
//! and snapshot requests from [`AggregatorHandle`]s, and stop. A snapshot is
//! the live table plus its lock; the next merge waits until the snapshot
//! holder drops it.

use crate::core::{FlowstatError, Result};
use crate::metrics::catalog::Catalog;
use crate::metrics::storage::MetricTable;
use crate::metrics::translate::translate;
use crate::metrics::types::MetricUpdate;
use crate::monitoring::PipelineMetrics;
use crate::receiver::envelope::StatEnvelope;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 64;

/// Envelopes drained ahead of a snapshot so it reflects everything queued
/// before the request.
const DEFAULT_DRAIN_LIMIT: usize = 64;

/// What a snapshot requester intends to do with the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Enumerate metric shapes only
    Describe,
    /// Read current values
    Collect,
}

/// Point-in-time view of the canonical table.
///
/// Holds the table lock; merges resume once this is dropped.
pub struct MetricSnapshot {
    kind: SnapshotKind,
    table: OwnedMutexGuard<MetricTable>,
}

impl MetricSnapshot {
    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }
}

impl Deref for MetricSnapshot {
    type Target = MetricTable;

    fn deref(&self) -> &MetricTable {
        &self.table
    }
}

impl DerefMut for MetricSnapshot {
    fn deref_mut(&mut self) -> &mut MetricTable {
        &mut self.table
    }
}

enum Command {
    Batch(Vec<MetricUpdate>),
    Snapshot {
        kind: SnapshotKind,
        reply: oneshot::Sender<MetricSnapshot>,
    },
}

/// Cloneable handle for talking to a running aggregator.
#[derive(Clone)]
pub struct AggregatorHandle {
    commands: mpsc::Sender<Command>,
    stop: Arc<watch::Sender<bool>>,
    stopped: Arc<AtomicBool>,
    catalog: Arc<Catalog>,
}

impl AggregatorHandle {
    /// Catalog the aggregator was seeded from
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Whether stop has been requested or the actor has exited
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Merge a pre-translated batch
    pub async fn submit(&self, updates: Vec<MetricUpdate>) -> Result<()> {
        if self.is_stopped() {
            return Err(FlowstatError::AggregatorStopped);
        }
        self.commands
            .send(Command::Batch(updates))
            .await
            .map_err(|_| FlowstatError::AggregatorStopped)
    }

    /// Request a snapshot, waiting at most `timeout` for the reply
    pub async fn snapshot(&self, kind: SnapshotKind, timeout: Duration) -> Result<MetricSnapshot> {
        if self.is_stopped() {
            return Err(FlowstatError::AggregatorStopped);
        }

        let request = async {
            let (reply, response) = oneshot::channel();
            self.commands
                .send(Command::Snapshot { kind, reply })
                .await
                .map_err(|_| FlowstatError::AggregatorStopped)?;
            response.await.map_err(|_| FlowstatError::AggregatorStopped)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FlowstatError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    /// Ask the actor to exit. Later submits and snapshots fail immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.stop.send(true);
    }
}

/// Single owner of the canonical metric state
pub struct Aggregator {
    catalog: Arc<Catalog>,
    table: Arc<Mutex<MetricTable>>,
    envelopes: mpsc::Receiver<StatEnvelope>,
    commands: mpsc::Receiver<Command>,
    stop: watch::Receiver<bool>,
    stopped: Arc<AtomicBool>,
    telemetry: Option<Arc<PipelineMetrics>>,
    drain_limit: usize,
}

impl Aggregator {
    /// Create the actor and its handle. The table is seeded from every
    /// enabled catalog entry.
    pub fn new(catalog: Arc<Catalog>, envelopes: mpsc::Receiver<StatEnvelope>) -> (Self, AggregatorHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let stopped = Arc::new(AtomicBool::new(false));

        let handle = AggregatorHandle {
            commands: command_tx,
            stop: Arc::new(stop_tx),
            stopped: Arc::clone(&stopped),
            catalog: Arc::clone(&catalog),
        };

        let aggregator = Self {
            table: Arc::new(Mutex::new(MetricTable::seeded(&catalog))),
            catalog,
            envelopes,
            commands: command_rx,
            stop: stop_rx,
            stopped,
            telemetry: None,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        };

        (aggregator, handle)
    }

    /// Count rejected envelopes and updates in `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<PipelineMetrics>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Run the event loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Event loop; returns once stopped or every handle is gone
    pub async fn run(mut self) {
        tracing::info!("Aggregator started with {} metrics", self.catalog.enabled().count());
        let mut envelopes_open = true;

        // Handlers return false once stop has been observed.
        loop {
            let running = tokio::select! {
                biased;

                _ = self.stop.changed() => false,

                command = self.commands.recv() => match command {
                    Some(Command::Batch(updates)) => self.merge(updates).await,
                    Some(Command::Snapshot { kind, reply }) => self.reply(kind, reply).await,
                    None => false,
                },

                envelope = self.envelopes.recv(), if envelopes_open => match envelope {
                    Some(envelope) => self.ingest(&envelope).await,
                    None => {
                        tracing::debug!("Envelope queue closed");
                        envelopes_open = false;
                        true
                    },
                },
            };

            if !running {
                break;
            }
        }

        self.stopped.store(true, Ordering::Release);
        tracing::info!("Aggregator stopped");
    }

    async fn ingest(&mut self, envelope: &StatEnvelope) -> bool {
        match translate(envelope, &self.catalog) {
            Ok(updates) => self.merge(updates).await,
            Err(e) => {
                tracing::warn!("Dropping {} envelope: {}", envelope.kind(), e);
                if let Some(telemetry) = &self.telemetry {
                    telemetry.envelopes_rejected.inc();
                }
                true
            },
        }
    }

    async fn merge(&mut self, updates: Vec<MetricUpdate>) -> bool {
        if updates.is_empty() {
            return true;
        }

        // A held snapshot blocks the lock; stop must still get through
        let mut table = tokio::select! {
            biased;
            _ = self.stop.changed() => return false,
            table = self.table.lock() => table,
        };
        let report = table.apply(updates);
        drop(table);
        tracing::trace!("Merged {} updates ({} rejected)", report.merged, report.failed);

        if report.failed > 0 {
            if let Some(telemetry) = &self.telemetry {
                telemetry.updates_rejected.inc_by(report.failed as u64);
            }
        }
        true
    }

    async fn reply(&mut self, kind: SnapshotKind, mut reply: oneshot::Sender<MetricSnapshot>) -> bool {
        if kind == SnapshotKind::Collect && !self.drain_queued().await {
            return false;
        }

        if reply.is_closed() {
            tracing::debug!("Snapshot requester went away before the reply");
            return true;
        }

        let table = tokio::select! {
            biased;
            _ = self.stop.changed() => return false,
            () = reply.closed() => {
                tracing::debug!("Snapshot requester gave up waiting for the table");
                return true;
            },
            table = Arc::clone(&self.table).lock_owned() => table,
        };

        if reply.send(MetricSnapshot { kind, table }).is_err() {
            tracing::debug!("Snapshot requester went away before the reply");
        }
        true
    }

    async fn drain_queued(&mut self) -> bool {
        for _ in 0..self.drain_limit {
            match self.envelopes.try_recv() {
                Ok(envelope) => {
                    if !self.ingest(&envelope).await {
                        return false;
                    }
                },
                Err(_) => break,
            }
        }
        true
    }
}
