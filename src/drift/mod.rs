//! Diff engine.
//!
//! Compares a baseline artifact against a head artifact and classifies
//! every difference into [`DriftItem`]s carrying a change type, a default
//! severity and an impact scope. Overridden items stay in the output.

mod classify;
mod impact;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::model::{
    ChangeType, FieldLineage, ImpactScope, LineageArtifact, Override, Severity, SystemId,
};

pub use classify::{compare_fields, compare_versions, Change};
pub use impact::ImpactGraph;

/// A flow reached by a drift item, with its catalog level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowTouch {
    /// Flow id.
    pub id: String,
    /// Catalog criticality level; `None` for flows missing from the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
}

/// One classified difference between two artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftItem {
    /// Affected field (head id for renamed fields).
    pub field_id: String,
    /// Classified kind.
    pub change_type: ChangeType,
    /// Default severity before policy.
    pub base_severity: Severity,
    /// Downstream reach.
    pub impact_scope: ImpactScope,
    /// What changed.
    pub message: String,
    /// System producing the field.
    pub producer: SystemId,
    /// Systems that consume the producer, transitively.
    pub consumers: Vec<SystemId>,
    /// Flows the producer and its consumers belong to.
    pub flows: Vec<FlowTouch>,
    /// Field owner.
    pub owner: String,
    /// Suppressed by an active override; still reported.
    pub overridden: bool,
    /// The override that matched.
    #[serde(rename = "override", skip_serializing_if = "Option::is_none")]
    pub matched_override: Option<Override>,
}

/// A field definition on either side of the diff.
struct FieldPair<'a> {
    base: Option<&'a FieldLineage>,
    head: Option<&'a FieldLineage>,
    renamed: bool,
}

/// Diffs two artifacts.
///
/// `today` decides which head-artifact overrides are active. The result is
/// sorted by `field_id` then `change_type`.
#[must_use]
pub fn diff(baseline: &LineageArtifact, head: &LineageArtifact, today: NaiveDate) -> Vec<DriftItem> {
    let base_by_id: BTreeMap<&str, &FieldLineage> =
        baseline.fields.iter().map(|f| (f.field_id.as_str(), f)).collect();
    let head_by_id: BTreeMap<&str, &FieldLineage> =
        head.fields.iter().map(|f| (f.field_id.as_str(), f)).collect();

    let mut pairs = Vec::new();
    let mut paired: BTreeSet<&str> = BTreeSet::new();
    for field in &head.fields {
        let Some(previous) = field.renamed_from.as_deref() else {
            continue;
        };
        if head_by_id.contains_key(previous) || base_by_id.contains_key(field.field_id.as_str()) {
            continue;
        }
        if let Some(&base) = base_by_id.get(previous) {
            paired.insert(previous);
            paired.insert(field.field_id.as_str());
            pairs.push(FieldPair { base: Some(base), head: Some(field), renamed: true });
        }
    }
    let ids: BTreeSet<&str> = base_by_id.keys().chain(head_by_id.keys()).copied().collect();
    for id in ids.into_iter().filter(|id| !paired.contains(id)) {
        pairs.push(FieldPair {
            base: base_by_id.get(id).copied(),
            head: head_by_id.get(id).copied(),
            renamed: false,
        });
    }

    let graph = ImpactGraph::new(baseline, head);
    let active: Vec<&Override> = head.overrides.iter().filter(|o| o.is_active(today)).collect();

    let mut items: Vec<DriftItem> = pairs
        .par_iter()
        .flat_map_iter(|pair| classify_pair(pair, &graph, &active))
        .collect();
    items.sort_by(|a, b| (&a.field_id, a.change_type.as_str()).cmp(&(&b.field_id, b.change_type.as_str())));

    tracing::info!(
        items = items.len(),
        overridden = items.iter().filter(|i| i.overridden).count(),
        "diffed lineage artifacts"
    );
    items
}

fn classify_pair(pair: &FieldPair<'_>, graph: &ImpactGraph<'_>, active: &[&Override]) -> Vec<DriftItem> {
    let (field, changes) = match (pair.base, pair.head) {
        (Some(base), None) => (
            base,
            vec![Change {
                change_type: ChangeType::FieldRemoved,
                severity: Severity::High,
                message: format!("field {} removed", base.field),
            }],
        ),
        (None, Some(head)) => (
            head,
            vec![Change {
                change_type: ChangeType::FieldAdded,
                severity: Severity::Medium,
                message: format!("field {} added", head.field),
            }],
        ),
        (Some(base), Some(head)) => {
            let mut changes = compare_fields(base, head);
            if pair.renamed {
                changes.insert(
                    0,
                    Change {
                        change_type: ChangeType::FieldRenamed,
                        severity: Severity::Medium,
                        message: format!("field_id {} renamed to {}", base.field_id, head.field_id),
                    },
                );
            }
            (head, changes)
        }
        (None, None) => return Vec::new(),
    };

    let producer = field.source_system.clone();
    let (impact_scope, consumers) = graph.scope(&producer);
    let flows = graph.flows_touched(std::iter::once(&producer).chain(consumers.iter()));

    changes
        .into_iter()
        .map(|change| {
            let matched = active
                .iter()
                .find(|o| o.matches(&field.field_id, change.change_type))
                .map(|o| (*o).clone());
            DriftItem {
                field_id: field.field_id.clone(),
                change_type: change.change_type,
                base_severity: change.severity,
                impact_scope,
                message: change.message,
                producer: producer.clone(),
                consumers: consumers.clone(),
                flows: flows.clone(),
                owner: field.owner.clone(),
                overridden: matched.is_some(),
                matched_override: matched,
            }
        })
        .collect()
}
