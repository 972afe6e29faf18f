//! Static registry of every metric the exporter knows about.
//!
//! Two independent tables: accounting statistics for message flows (flow and
//! node level) and resource statistics (JVM). Field names are owned by the
//! engine and must match its JSON output exactly.

use crate::metrics::types::{CatalogKey, LabelShape, MergeType, MetricDescriptor, Unit};
use std::collections::HashMap;

const fn descriptor(
    name: &'static str,
    field: &'static str,
    description: &'static str,
    merge: MergeType,
    unit: Unit,
    shape: LabelShape,
) -> MetricDescriptor {
    MetricDescriptor {
        name,
        field,
        description,
        merge,
        unit,
        shape,
        enabled: true,
    }
}

use LabelShape::{FlowLevel, FlowNodeLevel, ResourceLevel};
use MergeType::{Max, Min, Replace, Sum};
use Unit::{Bytes, Count, Megabytes, Microseconds, Seconds};

/// Accounting and statistics metrics, flow and node level
#[rustfmt::skip]
pub static FLOW_STATISTICS: &[MetricDescriptor] = &[
    descriptor("msgflow_elapsed_time_seconds_total", "TotalElapsedTime",
        "Total elapsed time spent processing messages by the message flow", Sum, Microseconds, FlowLevel),
    descriptor("msgflow_elapsed_time_seconds_max", "MaximumElapsedTime",
        "Maximum elapsed time spent processing a message by the message flow", Max, Microseconds, FlowLevel),
    descriptor("msgflow_elapsed_time_seconds_min", "MinimumElapsedTime",
        "Minimum elapsed time spent processing a message by the message flow", Min, Microseconds, FlowLevel),
    descriptor("msgflow_cpu_time_seconds_total", "TotalCPUTime",
        "Total CPU time spent processing messages by the message flow", Sum, Microseconds, FlowLevel),
    descriptor("msgflow_cpu_time_seconds_max", "MaximumCPUTime",
        "Maximum CPU time spent processing a message by the message flow", Max, Microseconds, FlowLevel),
    descriptor("msgflow_cpu_time_seconds_min", "MinimumCPUTime",
        "Minimum CPU time spent processing a message by the message flow", Min, Microseconds, FlowLevel),
    descriptor("msgflow_cpu_time_waiting_seconds_total", "TotalCPUTimeWaiting",
        "Total CPU time spent waiting for input messages by the message flow", Sum, Microseconds, FlowLevel),
    descriptor("msgflow_elapsed_time_waiting_seconds_total", "TotalElapsedTimeWaiting",
        "Total elapsed time spent waiting for input messages by the message flow", Sum, Microseconds, FlowLevel),
    descriptor("msgflow_messages_total", "TotalInputMessages",
        "Total number of messages processed by the message flow", Sum, Count, FlowLevel),
    descriptor("msgflow_message_size_bytes_total", "TotalSizeOfInputMessages",
        "Total size of input messages processed by the message flow", Sum, Bytes, FlowLevel),
    descriptor("msgflow_message_size_bytes_max", "MaximumSizeOfInputMessages",
        "Maximum size of input message processed by the message flow", Max, Bytes, FlowLevel),
    descriptor("msgflow_message_size_bytes_min", "MinimumSizeOfInputMessages",
        "Minimum size of input message processed by the message flow", Min, Bytes, FlowLevel),
    descriptor("msgflow_threads_in_pool", "NumberOfThreadsInPool",
        "Number of threads in the message flow thread pool", Replace, Count, FlowLevel),
    descriptor("msgflow_threads_max_reached_total", "TimesMaximumNumberOfThreadsReached",
        "Number of times the maximum number of threads in the pool was reached", Sum, Count, FlowLevel),
    descriptor("msgflow_mq_errors_total", "TotalNumberOfMQErrors",
        "Number of MQ errors encountered by the message flow", Sum, Count, FlowLevel),
    descriptor("msgflow_messages_with_errors_total", "TotalNumberOfMessagesWithErrors",
        "Number of messages processed by the message flow that contained errors", Sum, Count, FlowLevel),
    descriptor("msgflow_errors_total", "TotalNumberOfErrorsProcessingMessages",
        "Number of errors encountered while processing messages", Sum, Count, FlowLevel),
    descriptor("msgflow_aggregation_timeouts_total", "TotalNumberOfTimeOutsWaitingForRepliesToAggregateMessages",
        "Number of timeouts while waiting for replies to aggregate messages", Sum, Count, FlowLevel),
    descriptor("msgflow_commits_total", "TotalNumberOfCommits",
        "Number of transaction commits performed by the message flow", Sum, Count, FlowLevel),
    descriptor("msgflow_backouts_total", "TotalNumberOfBackouts",
        "Number of transaction backouts performed by the message flow", Sum, Count, FlowLevel),
    descriptor("msgflownode_elapsed_time_seconds_total", "TotalElapsedTime",
        "Total elapsed time spent processing messages by the node", Sum, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_elapsed_time_seconds_max", "MaximumElapsedTime",
        "Maximum elapsed time spent processing a message by the node", Max, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_elapsed_time_seconds_min", "MinimumElapsedTime",
        "Minimum elapsed time spent processing a message by the node", Min, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_cpu_time_seconds_total", "TotalCPUTime",
        "Total CPU time spent processing messages by the node", Sum, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_cpu_time_seconds_max", "MaximumCPUTime",
        "Maximum CPU time spent processing a message by the node", Max, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_cpu_time_seconds_min", "MinimumCPUTime",
        "Minimum CPU time spent processing a message by the node", Min, Microseconds, FlowNodeLevel),
    descriptor("msgflownode_invocations_total", "CountOfInvocations",
        "Number of times the node was invoked", Sum, Count, FlowNodeLevel),
    descriptor("msgflownode_input_terminals", "NumberOfInputTerminals",
        "Number of input terminals on the node", Replace, Count, FlowNodeLevel),
    descriptor("msgflownode_output_terminals", "NumberOfOutputTerminals",
        "Number of output terminals on the node", Replace, Count, FlowNodeLevel),
];

/// Resource statistics metrics (JVM summary)
#[rustfmt::skip]
pub static RESOURCE_STATISTICS: &[MetricDescriptor] = &[
    descriptor("jvm_memory_initial_bytes", "InitialMemoryInMB",
        "Initial memory allocated to the JVM", Replace, Megabytes, ResourceLevel),
    descriptor("jvm_memory_used_bytes", "UsedMemoryInMB",
        "Memory currently used by the JVM", Replace, Megabytes, ResourceLevel),
    descriptor("jvm_memory_committed_bytes", "CommittedMemoryInMB",
        "Memory committed to the JVM", Replace, Megabytes, ResourceLevel),
    descriptor("jvm_memory_max_bytes", "MaxMemoryInMB",
        "Maximum memory the JVM may use", Replace, Megabytes, ResourceLevel),
    descriptor("jvm_gc_time_seconds_total", "CumulativeGCTimeInSeconds",
        "Cumulative time spent in garbage collection", Replace, Seconds, ResourceLevel),
    descriptor("jvm_gc_collections_total", "CumulativeNumberOfGCCollections",
        "Cumulative number of garbage collections", Replace, Count, ResourceLevel),
];

/// Whether `name` exists in either built-in table
pub fn is_known(name: &str) -> bool {
    FLOW_STATISTICS
        .iter()
        .chain(RESOURCE_STATISTICS)
        .any(|d| d.name == name)
}

/// The metric catalog, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: Vec<MetricDescriptor>,
    index: HashMap<CatalogKey, usize>,
}

impl Catalog {
    /// Catalog with every built-in metric enabled
    pub fn builtin() -> Self {
        Self::with_disabled::<&str>(&[])
    }

    /// Catalog with the named metrics disabled
    pub fn with_disabled<S: AsRef<str>>(disabled: &[S]) -> Self {
        let descriptors: Vec<MetricDescriptor> = FLOW_STATISTICS
            .iter()
            .chain(RESOURCE_STATISTICS)
            .map(|d| MetricDescriptor {
                enabled: !disabled.iter().any(|name| name.as_ref() == d.name),
                ..*d
            })
            .collect();

        let index = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect();

        Self { descriptors, index }
    }

    /// Look up a descriptor by catalog key
    pub fn get(&self, key: &str) -> Option<&MetricDescriptor> {
        self.index.get(key).map(|&i| &self.descriptors[i])
    }

    /// Every descriptor, enabled or not
    pub fn all(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Enabled descriptors only
    pub fn enabled(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    /// Enabled descriptors of one label shape
    pub fn enabled_with_shape(&self, shape: LabelShape) -> impl Iterator<Item = &MetricDescriptor> {
        self.enabled().filter(move |d| d.shape == shape)
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True if the catalog holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let catalog = Catalog::builtin();
        let names: HashSet<_> = catalog.all().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_tables_use_expected_shapes() {
        assert!(FLOW_STATISTICS.iter().all(|d| d.shape != LabelShape::ResourceLevel));
        assert!(RESOURCE_STATISTICS.iter().all(|d| d.shape == LabelShape::ResourceLevel));
    }

    #[test]
    fn test_disabled_entries() {
        let catalog = Catalog::with_disabled(&["msgflow_commits_total"]);
        let commits = catalog.get("msgflow_commits_total").unwrap();
        assert!(!commits.enabled);
        assert_eq!(catalog.enabled().count(), catalog.len() - 1);
    }

    #[test]
    fn test_is_known() {
        assert!(is_known("jvm_memory_used_bytes"));
        assert!(is_known("msgflownode_invocations_total"));
        assert!(!is_known("TotalElapsedTime"));
    }

    #[test]
    fn test_lookup_by_key() {
        let catalog = Catalog::builtin();
        let descriptor = catalog.get("msgflow_elapsed_time_seconds_max").unwrap();
        assert_eq!(descriptor.field, "MaximumElapsedTime");
        assert_eq!(descriptor.merge, MergeType::Max);
        assert_eq!(descriptor.unit, Unit::Microseconds);
        assert!(catalog.get("missing").is_none());
    }
}
