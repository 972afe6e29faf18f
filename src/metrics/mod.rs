//! Canonical metric model and aggregation.
//!
//! - `catalog`: the fixed set of engine metrics and how each one merges
//! - `translate`: decoded envelopes to metric updates
//! - `storage`: the canonical table updates merge into
//! - `aggregator`: single-owner actor serializing merges and snapshots

pub mod aggregator;
pub mod catalog;
pub mod normalize;
pub mod storage;
pub mod translate;
pub mod types;

pub use aggregator::{Aggregator, AggregatorHandle, MetricSnapshot, SnapshotKind};
pub use catalog::Catalog;
pub use storage::{CanonicalMetric, MergeReport, MetricTable};
pub use types::{LabelShape, MergeType, MetricDescriptor, MetricUpdate, Sample, Unit};
