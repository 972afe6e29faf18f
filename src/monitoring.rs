//! Self-telemetry of the statistics pipeline.
//!
//! These counters describe the exporter itself (stream health, rejected
//! frames, scrapes) and are served next to the engine metrics under the
//! `<namespace>_exporter_` prefix.

use crate::core::Result;
use prometheus::{IntCounter, IntGauge, Opts, Registry};

const SUBSYSTEM: &str = "exporter";

/// Operational counters for the reader, aggregator and exporter.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    /// Frames read from the statistics socket
    pub frames_received: IntCounter,
    /// Frames that failed to decode
    pub frames_rejected: IntCounter,
    /// Envelopes that failed translation
    pub envelopes_rejected: IntCounter,
    /// Updates rejected during merge
    pub updates_rejected: IntCounter,
    /// Connection attempts after the first
    pub reconnects: IntCounter,
    /// 1 while the statistics socket is connected
    pub connected: IntGauge,
    /// Completed scrapes
    pub scrapes: IntCounter,
    /// Scrapes that failed to obtain a snapshot
    pub scrape_failures: IntCounter,
}

impl PipelineMetrics {
    /// Build the counters under `namespace`
    pub fn new(namespace: &str) -> Result<Self> {
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(name, help).namespace(namespace).subsystem(SUBSYSTEM))
        };

        Ok(Self {
            frames_received: counter("frames_received_total", "Statistics frames read from the engine")?,
            frames_rejected: counter("frames_rejected_total", "Statistics frames that failed to decode")?,
            envelopes_rejected: counter(
                "envelopes_rejected_total",
                "Decoded envelopes that failed translation",
            )?,
            updates_rejected: counter("updates_rejected_total", "Metric updates rejected during merge")?,
            reconnects: counter("reconnects_total", "Reconnect attempts to the statistics feed")?,
            connected: IntGauge::with_opts(
                Opts::new("connected", "Whether the statistics feed is connected")
                    .namespace(namespace)
                    .subsystem(SUBSYSTEM),
            )?,
            scrapes: counter("scrapes_total", "Completed scrapes")?,
            scrape_failures: counter("scrape_failures_total", "Scrapes that could not reach the aggregator")?,
        })
    }

    /// Register every counter with `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.frames_received.clone()))?;
        registry.register(Box::new(self.frames_rejected.clone()))?;
        registry.register(Box::new(self.envelopes_rejected.clone()))?;
        registry.register(Box::new(self.updates_rejected.clone()))?;
        registry.register(Box::new(self.reconnects.clone()))?;
        registry.register(Box::new(self.connected.clone()))?;
        registry.register(Box::new(self.scrapes.clone()))?;
        registry.register(Box::new(self.scrape_failures.clone()))?;
        Ok(())
    }

    /// Whether the statistics feed is currently connected
    pub fn is_connected(&self) -> bool {
        self.connected.get() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once() {
        let registry = Registry::new();
        let metrics = PipelineMetrics::new("test").unwrap();
        metrics.register(&registry).unwrap();

        metrics.frames_received.inc();
        metrics.connected.set(1);
        assert!(metrics.is_connected());

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"test_exporter_frames_received_total".to_string()));
        assert!(names.contains(&"test_exporter_connected".to_string()));

        // A second registration of the same collectors is refused
        assert!(metrics.register(&registry).is_err());
    }
}
