//! Decoded frames of the engine statistics feed.
//!
//! Frames are JSON objects of the form `{"event": <n>, "data": {...}}`. Only
//! the identifying fields are typed; numeric statistics stay in a raw field
//! map so the catalog decides what is read.

use crate::core::{FlowstatError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Discriminant of accounting and statistics frames
pub const EVENT_ACCOUNTING: i64 = 0;
/// Discriminant of resource statistics frames
pub const EVENT_RESOURCE: i64 = 1;

/// Accounting origin reported when the flow does not set one
pub const ANONYMOUS_ORIGIN: &str = "Anonymous";

/// Raw statistics keyed by engine field name
pub type Fields = Map<String, Value>;

/// One decoded frame of the statistics stream
#[derive(Debug, Clone, PartialEq)]
pub enum StatEnvelope {
    /// Message flow accounting and statistics
    Accounting(AccountingReport),
    /// Resource statistics (JVM and others)
    Resource(ResourceReport),
}

#[derive(Deserialize)]
struct RawFrame {
    event: i64,
    #[serde(default)]
    data: Value,
}

impl StatEnvelope {
    /// Decode one text frame
    pub fn decode(text: &str) -> Result<Self> {
        let frame: RawFrame = serde_json::from_str(text)?;
        match frame.event {
            EVENT_ACCOUNTING => Ok(Self::Accounting(serde_json::from_value(frame.data)?)),
            EVENT_RESOURCE => Ok(Self::Resource(serde_json::from_value(frame.data)?)),
            other => Err(FlowstatError::protocol(format!("unknown statistics event {}", other))),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accounting(_) => "accounting",
            Self::Resource(_) => "resource",
        }
    }
}

/// Payload of an accounting frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountingReport {
    #[serde(rename = "WMQIStatisticsAccounting")]
    pub accounting: AccountingStatistics,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountingStatistics {
    #[serde(rename = "MessageFlow")]
    pub message_flow: FlowRecord,
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<NodeRecord>,
}

/// Flow-level statistics of one message flow
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowRecord {
    /// Integration server that reported the flow
    #[serde(rename = "ExecutionGroupName", default)]
    pub server: String,
    /// Accounting origin set by the flow; empty when unset
    #[serde(rename = "AccountingOrigin", default)]
    pub accounting_origin: String,
    #[serde(rename = "ApplicationName", default)]
    pub application: String,
    #[serde(rename = "MessageFlowName", default)]
    pub name: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl FlowRecord {
    /// Accounting origin, or [`ANONYMOUS_ORIGIN`] when unset
    pub fn origin(&self) -> &str {
        if self.accounting_origin.is_empty() {
            ANONYMOUS_ORIGIN
        } else {
            &self.accounting_origin
        }
    }
}

/// Node-level statistics within a flow
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "Label", default)]
    pub label: String,
    #[serde(rename = "Type", default)]
    pub node_type: String,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Payload of a resource statistics frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceReport {
    #[serde(rename = "ResourceStatistics")]
    pub statistics: ResourceStatistics,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceStatistics {
    #[serde(rename = "executionGroupName", default)]
    pub server: String,
    #[serde(rename = "ResourceType", default)]
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceType {
    pub name: String,
    #[serde(rename = "resourceIdentifier", default)]
    pub identifiers: Vec<ResourceIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceIdentifier {
    pub name: String,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Read a named integer statistic, tolerating floats and numeric strings
#[allow(clippy::cast_possible_truncation)]
pub fn numeric_field(fields: &Fields, name: &str) -> Option<i64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
