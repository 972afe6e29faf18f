//! Core metric types shared by the catalog, translator and aggregator.

/// Separator used to join label values into a sample key.
///
/// ASCII unit separator; never appears in server, application or flow names.
pub const LABEL_KEY_SEPARATOR: char = '\u{1f}';

/// Policy for combining a new observation into existing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    /// Delta accumulated until the next scrape
    Sum,
    /// Smallest value ever observed
    Min,
    /// Largest value ever observed
    Max,
    /// Latest value wins
    Replace,
}

impl MergeType {
    /// Merge `incoming` into `current`
    #[inline]
    pub fn merge(self, current: f64, incoming: f64) -> f64 {
        match self {
            MergeType::Sum => current + incoming,
            MergeType::Min => current.min(incoming),
            MergeType::Max => current.max(incoming),
            MergeType::Replace => incoming,
        }
    }

    /// Whether emitted samples are cleared after each scrape
    pub fn resets_on_read(self) -> bool {
        matches!(self, MergeType::Sum)
    }
}

/// Unit of the raw value reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Microseconds,
    Seconds,
    Bytes,
    Megabytes,
    Count,
}

/// Which label dimensions a metric carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelShape {
    /// server, accountingorigin, application, msgflow
    FlowLevel,
    /// flow labels plus msgflownode, msgflownodetype
    FlowNodeLevel,
    /// server
    ResourceLevel,
}

const FLOW_LABELS: &[&str] = &["server", "accountingorigin", "application", "msgflow"];
const FLOW_NODE_LABELS: &[&str] = &[
    "server",
    "accountingorigin",
    "application",
    "msgflow",
    "msgflownode",
    "msgflownodetype",
];
const RESOURCE_LABELS: &[&str] = &["server"];

impl LabelShape {
    /// Label names in emission order
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            LabelShape::FlowLevel => FLOW_LABELS,
            LabelShape::FlowNodeLevel => FLOW_NODE_LABELS,
            LabelShape::ResourceLevel => RESOURCE_LABELS,
        }
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDescriptor {
    /// Exported name (without namespace); also the catalog key
    pub name: &'static str,
    /// Engine field the raw value is read from
    pub field: &'static str,
    /// Help text
    pub description: &'static str,
    pub merge: MergeType,
    pub unit: Unit,
    pub shape: LabelShape,
    pub enabled: bool,
}

/// Catalog key of a metric (its exported name)
pub type CatalogKey = &'static str;

/// One (label set, value) pair of a canonical metric
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<String>,
    pub value: f64,
}

/// A single translated observation waiting to be merged
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub catalog_key: CatalogKey,
    pub label_key: String,
    pub labels: Vec<String>,
    pub value: f64,
}

impl MetricUpdate {
    /// Build an update, deriving the label key from the label values
    pub fn new(catalog_key: CatalogKey, labels: Vec<String>, value: f64) -> Self {
        Self {
            catalog_key,
            label_key: label_key(&labels),
            labels,
            value,
        }
    }
}

/// Join label values into a composite sample key
pub fn label_key<S: AsRef<str>>(values: &[S]) -> String {
    let mut key = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            key.push(LABEL_KEY_SEPARATOR);
        }
        key.push_str(value.as_ref());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_semantics() {
        assert_eq!(MergeType::Sum.merge(2.0, 3.0), 5.0);
        assert_eq!(MergeType::Min.merge(2.0, 3.0), 2.0);
        assert_eq!(MergeType::Max.merge(2.0, 3.0), 3.0);
        assert_eq!(MergeType::Replace.merge(2.0, 3.0), 3.0);
    }

    #[test]
    fn test_only_sum_resets() {
        assert!(MergeType::Sum.resets_on_read());
        assert!(!MergeType::Min.resets_on_read());
        assert!(!MergeType::Max.resets_on_read());
        assert!(!MergeType::Replace.resets_on_read());
    }

    #[test]
    fn test_label_key_is_unambiguous() {
        let a = label_key(&["a_b", "c"]);
        let b = label_key(&["a", "b_c"]);
        assert_ne!(a, b);
        assert_eq!(label_key::<&str>(&[]), "");
    }

    #[test]
    fn test_label_shapes() {
        assert_eq!(
            LabelShape::FlowLevel.label_names(),
            &["server", "accountingorigin", "application", "msgflow"]
        );
        assert_eq!(LabelShape::FlowNodeLevel.label_names().len(), 6);
        assert!(LabelShape::FlowNodeLevel.label_names().starts_with(LabelShape::FlowLevel.label_names()));
        assert_eq!(LabelShape::ResourceLevel.label_names(), &["server"]);
    }
}
