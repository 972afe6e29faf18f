//! Prometheus export of the canonical metric table.
//!
//! Describe happens once, when the exporter is built: one gauge vector per
//! enabled catalog metric is registered with the registry. Every collect
//! takes a snapshot from the aggregator, copies each sample into its gauge
//! vector, clears Sum samples so the next interval starts from zero, and
//! gathers the registry before the snapshot lock is released. Holding the
//! lock through the gather keeps concurrent scrapes from interleaving.

use crate::core::{FlowstatError, Result};
use crate::metrics::aggregator::{AggregatorHandle, SnapshotKind};
use crate::metrics::storage::CanonicalMetric;
use crate::metrics::types::CatalogKey;
use crate::monitoring::PipelineMetrics;
use ahash::AHashMap;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Bridges aggregator snapshots to a Prometheus registry
pub struct MetricsExporter {
    aggregator: AggregatorHandle,
    registry: Registry,
    gauges: AHashMap<CatalogKey, GaugeVec>,
    timeout: Duration,
    telemetry: Option<Arc<PipelineMetrics>>,
}

impl MetricsExporter {
    /// Register every enabled metric with `registry`.
    ///
    /// Call once per registry: registering the same names again is rejected
    /// by the registry.
    pub async fn describe(
        aggregator: AggregatorHandle,
        registry: Registry,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let snapshot = aggregator.snapshot(SnapshotKind::Describe, timeout).await?;

        let mut gauges = AHashMap::with_capacity(snapshot.len());
        for metric in snapshot.metrics() {
            let descriptor = metric.descriptor();
            let opts = Opts::new(descriptor.name, descriptor.description).namespace(namespace);
            let gauge = GaugeVec::new(opts, descriptor.shape.label_names())?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(descriptor.name, gauge);
        }
        drop(snapshot);

        tracing::info!("Registered {} metrics under namespace {}", gauges.len(), namespace);

        Ok(Self {
            aggregator,
            registry,
            gauges,
            timeout,
            telemetry: None,
        })
    }

    /// Count scrapes and scrape failures in `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<PipelineMetrics>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Collect current values from the aggregator and gather the registry.
    ///
    /// Fails if the aggregator cannot produce a snapshot in time; an
    /// unreachable aggregator never reads as an empty scrape.
    pub async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let mut snapshot = match self.aggregator.snapshot(SnapshotKind::Collect, self.timeout).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.scrape_failures.inc();
                }
                return Err(e);
            },
        };

        for metric in snapshot.metrics_mut() {
            self.emit(metric);
            metric.reset_after_read();
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.scrapes.inc();
        }

        let families = self.registry.gather();
        drop(snapshot);
        Ok(families)
    }

    /// Collect and encode in the text exposition format
    pub async fn render(&self) -> Result<String> {
        let families = self.collect().await?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| FlowstatError::protocol(format!("exposition is not UTF-8: {}", e)))
    }

    fn emit(&self, metric: &CanonicalMetric) {
        let name = metric.descriptor().name;
        let Some(gauge) = self.gauges.get(name) else {
            return;
        };

        gauge.reset();
        for sample in metric.samples() {
            let labels: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            match gauge.get_metric_with_label_values(&labels) {
                Ok(point) => point.set(sample.value),
                Err(e) => tracing::warn!("Skipping sample of {} with labels {:?}: {}", name, labels, e),
            }
        }
    }
}

/// Text exposition content type
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
