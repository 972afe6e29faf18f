//! Canonical metric state owned by the aggregator.
//!
//! The table is seeded once from the enabled catalog, so every catalog key a
//! translated update can carry already has a `CanonicalMetric`. Samples are
//! created on first observation of a label key and merged in place after
//! that.

use crate::core::{FlowstatError, Result};
use crate::metrics::catalog::Catalog;
use crate::metrics::types::{CatalogKey, MetricDescriptor, MetricUpdate, Sample};
use ahash::AHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Running state of one catalog metric
#[derive(Debug, Clone)]
pub struct CanonicalMetric {
    descriptor: MetricDescriptor,
    samples: AHashMap<String, Sample>,
}

impl CanonicalMetric {
    /// Empty metric for a descriptor
    pub fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            samples: AHashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Sample for a composite label key
    pub fn sample(&self, label_key: &str) -> Option<&Sample> {
        self.samples.get(label_key)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Merge one update. The first observation of a label key is adopted
    /// as-is for every merge type.
    pub fn merge(&mut self, update: MetricUpdate) -> Result<()> {
        if !update.value.is_finite() || update.value < 0.0 {
            return Err(FlowstatError::InvalidValue {
                metric: self.descriptor.name.to_string(),
                value: update.value,
            });
        }

        let merge = self.descriptor.merge;
        match self.samples.get_mut(&update.label_key) {
            Some(sample) => sample.value = merge.merge(sample.value, update.value),
            None => {
                self.samples.insert(
                    update.label_key,
                    Sample {
                        labels: update.labels,
                        value: update.value,
                    },
                );
            },
        }
        Ok(())
    }

    /// Drop accumulated deltas once they have been read; no-op for
    /// Min, Max and Replace metrics.
    pub fn reset_after_read(&mut self) {
        if self.descriptor.merge.resets_on_read() {
            self.samples.clear();
        }
    }
}

/// Outcome of merging one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: usize,
    pub failed: usize,
}

/// The canonical metric table
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    metrics: AHashMap<CatalogKey, CanonicalMetric>,
}

impl MetricTable {
    /// Table with one empty metric per enabled catalog entry
    pub fn seeded(catalog: &Catalog) -> Self {
        let metrics = catalog
            .enabled()
            .map(|d| (d.name, CanonicalMetric::new(*d)))
            .collect();
        Self { metrics }
    }

    pub fn get(&self, key: &str) -> Option<&CanonicalMetric> {
        self.metrics.get(key)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &CanonicalMetric> {
        self.metrics.values()
    }

    pub fn metrics_mut(&mut self) -> impl Iterator<Item = &mut CanonicalMetric> {
        self.metrics.values_mut()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Value of one sample, if it has been observed
    pub fn value(&self, key: &str, label_key: &str) -> Option<f64> {
        self.get(key)?.sample(label_key).map(|s| s.value)
    }

    /// Merge a batch. Each update is applied on its own: a rejected or
    /// panicking merge is logged and never blocks the rest of the batch.
    pub fn apply(&mut self, updates: Vec<MetricUpdate>) -> MergeReport {
        self.apply_with(updates, Self::merge_one)
    }

    fn apply_with<F>(&mut self, updates: Vec<MetricUpdate>, mut merge: F) -> MergeReport
    where
        F: FnMut(&mut Self, MetricUpdate) -> Result<()>,
    {
        let mut report = MergeReport::default();

        for update in updates {
            let key = update.catalog_key;
            let outcome = catch_unwind(AssertUnwindSafe(|| merge(self, update)));

            match outcome {
                Ok(Ok(())) => report.merged += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Dropping update for {}: {}", key, e);
                    report.failed += 1;
                },
                Err(_) => {
                    tracing::error!("Merge panicked for {}, update dropped", key);
                    report.failed += 1;
                },
            }
        }

        report
    }

    fn merge_one(&mut self, update: MetricUpdate) -> Result<()> {
        let metric = self
            .metrics
            .get_mut(update.catalog_key)
            .ok_or_else(|| FlowstatError::UnknownMetric(update.catalog_key.to_string()))?;
        metric.merge(update)
    }
}
