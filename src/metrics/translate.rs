//! Translation of decoded envelopes into labeled metric updates.
//!
//! Translation is a pure function of the envelope and the catalog. The
//! aggregator calls it inline for every envelope it dequeues.

use crate::core::{FlowstatError, Result};
use crate::metrics::catalog::Catalog;
use crate::metrics::normalize::normalize;
use crate::metrics::types::{LabelShape, MetricDescriptor, MetricUpdate};
use crate::receiver::envelope::{
    numeric_field, AccountingReport, Fields, ResourceReport, StatEnvelope,
};

/// Resource type the resource table is specialized for
pub const JVM_RESOURCE_TYPE: &str = "JVM";
/// Identifier within the JVM resource carrying the summary figures
pub const JVM_SUMMARY_IDENTIFIER: &str = "summary";

/// Convert one envelope into a batch of updates
pub fn translate(envelope: &StatEnvelope, catalog: &Catalog) -> Result<Vec<MetricUpdate>> {
    match envelope {
        StatEnvelope::Accounting(report) => translate_accounting(report, catalog),
        StatEnvelope::Resource(report) => Ok(translate_resource(report, catalog)),
    }
}

fn translate_accounting(report: &AccountingReport, catalog: &Catalog) -> Result<Vec<MetricUpdate>> {
    let flow = &report.accounting.message_flow;
    if flow.name.is_empty() {
        return Err(FlowstatError::translate("accounting record has empty MessageFlowName"));
    }

    let origin = flow.origin();
    let flow_labels = [flow.server.as_str(), origin, flow.application.as_str(), flow.name.as_str()];
    let mut updates = Vec::new();

    push_shape(&mut updates, catalog, LabelShape::FlowLevel, &flow.fields, &flow_labels);

    for node in &report.accounting.nodes {
        let node_labels = [
            flow.server.as_str(),
            origin,
            flow.application.as_str(),
            flow.name.as_str(),
            node.label.as_str(),
            node.node_type.as_str(),
        ];
        push_shape(&mut updates, catalog, LabelShape::FlowNodeLevel, &node.fields, &node_labels);
    }

    Ok(updates)
}

fn translate_resource(report: &ResourceReport, catalog: &Catalog) -> Vec<MetricUpdate> {
    let statistics = &report.statistics;
    let mut updates = Vec::new();

    for resource in &statistics.resource_types {
        if resource.name != JVM_RESOURCE_TYPE {
            tracing::trace!("Skipping resource type {}", resource.name);
            continue;
        }

        let Some(summary) = resource
            .identifiers
            .iter()
            .find(|id| id.name == JVM_SUMMARY_IDENTIFIER)
        else {
            continue;
        };

        let labels = [statistics.server.as_str()];
        push_shape(&mut updates, catalog, LabelShape::ResourceLevel, &summary.fields, &labels);
    }

    updates
}

/// One update per enabled metric of `shape` whose field is present
fn push_shape(
    updates: &mut Vec<MetricUpdate>,
    catalog: &Catalog,
    shape: LabelShape,
    fields: &Fields,
    labels: &[&str],
) {
    for descriptor in catalog.enabled_with_shape(shape) {
        if let Some(update) = update_for(descriptor, fields, labels) {
            updates.push(update);
        }
    }
}

fn update_for(descriptor: &MetricDescriptor, fields: &Fields, labels: &[&str]) -> Option<MetricUpdate> {
    let Some(raw) = numeric_field(fields, descriptor.field) else {
        tracing::trace!("Field {} absent for {}", descriptor.field, descriptor.name);
        return None;
    };

    let labels = labels.iter().map(|l| (*l).to_string()).collect();
    Some(MetricUpdate::new(descriptor.name, labels, normalize(raw, descriptor.unit)))
}
