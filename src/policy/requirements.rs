//! Checks on the head artifact that run independently of drift.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::unknown_flow_refs;
use crate::model::{ChangeType, FieldLineage, LineageArtifact, SystemId};

use super::pack::Requirements;

/// A rule broken by the head artifact itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    /// Field id, `system:<id>` or `override:<field_id>`.
    pub subject: String,
    /// `missing_required_key`, `unknown_flow_id`, `unregistered_system` or
    /// `unknown_override_field`.
    pub change_type: ChangeType,
    /// What is wrong.
    pub message: String,
    /// Who should fix it.
    pub owner: String,
    /// System the subject belongs to.
    pub producer: Option<SystemId>,
}

/// Runs required-key and referential checks.
#[must_use]
pub fn check(head: &LineageArtifact, require: &Requirements) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for field in &head.fields {
        check_field(field, require, &mut violations);
    }

    let owners = field_owners(&head.fields);
    for system in &head.systems {
        for key in &require.system_registry_keys {
            if !system.has_key(key) {
                violations.push(RuleViolation {
                    subject: format!("system:{}", system.id),
                    change_type: ChangeType::MissingRequiredKey,
                    message: format!("system {} is missing required registry key {key}", system.id),
                    owner: owner_of(&system.owner_team, owners.get(&system.id)),
                    producer: Some(system.id.clone()),
                });
            }
        }
    }

    for ov in &head.overrides {
        for key in &require.override_keys {
            if !ov.has_key(key) {
                violations.push(RuleViolation {
                    subject: format!("override:{}", ov.field_id),
                    change_type: ChangeType::MissingRequiredKey,
                    message: format!(
                        "override for {} ({}) is missing required key {key}",
                        ov.field_id, ov.change_type
                    ),
                    owner: head.field(&ov.field_id).map(|f| f.owner.clone()).unwrap_or_default(),
                    producer: head.field(&ov.field_id).map(|f| f.source_system.clone()),
                });
            }
        }
    }

    let registry = head.registry();
    for unknown in unknown_flow_refs(&registry) {
        let system = head.systems.iter().find(|s| s.id.as_str() == unknown.system_id);
        violations.push(RuleViolation {
            subject: format!("system:{}", unknown.system_id),
            change_type: ChangeType::UnknownFlowId,
            message: format!(
                "system {} lists flow {} which the flow catalog does not define",
                unknown.system_id, unknown.flow_id
            ),
            owner: system.map(|s| s.owner_team.clone()).unwrap_or_default(),
            producer: system.map(|s| s.id.clone()),
        });
    }

    if !head.systems.is_empty() {
        let mut referenced: BTreeMap<&SystemId, &FieldLineage> = BTreeMap::new();
        for field in &head.fields {
            referenced.entry(&field.source_system).or_insert(field);
            for upstream in field.upstream_systems() {
                referenced.entry(upstream).or_insert(field);
            }
        }
        for (id, field) in referenced {
            if registry.lookup(id).is_none() {
                violations.push(RuleViolation {
                    subject: format!("system:{id}"),
                    change_type: ChangeType::UnregisteredSystem,
                    message: format!("system {id} is referenced by field {} but not registered", field.field_id),
                    owner: owners.get(id).cloned().unwrap_or_default(),
                    producer: Some(id.clone()),
                });
            }
        }
    }

    tracing::debug!(violations = violations.len(), "checked lineage requirements");
    violations
}

/// Overrides whose `field_id` matches no head field and none of the
/// `removed` baseline ids.
///
/// A field renamed in head is still known under its `renamed_from` id.
#[must_use]
pub fn dangling_overrides(head: &LineageArtifact, removed: &BTreeSet<&str>) -> Vec<RuleViolation> {
    let known: BTreeSet<&str> = head
        .fields
        .iter()
        .flat_map(|f| std::iter::once(f.field_id.as_str()).chain(f.renamed_from.as_deref()))
        .chain(removed.iter().copied())
        .collect();
    head.overrides
        .iter()
        .filter(|ov| !known.contains(ov.field_id.as_str()))
        .map(|ov| RuleViolation {
            subject: format!("override:{}", ov.field_id),
            change_type: ChangeType::UnknownOverrideField,
            message: format!(
                "override for {} ({}) names a field neither artifact defines",
                ov.field_id, ov.change_type
            ),
            owner: String::new(),
            producer: None,
        })
        .collect()
}

fn check_field(field: &FieldLineage, require: &Requirements, out: &mut Vec<RuleViolation>) {
    for key in &require.field_keys {
        if !field.declares(key) {
            out.push(RuleViolation {
                subject: field.field_id.clone(),
                change_type: ChangeType::MissingRequiredKey,
                message: format!("field {} does not declare required key {key}", field.field_id),
                owner: field.owner.clone(),
                producer: Some(field.source_system.clone()),
            });
        }
    }
    for source in &field.sources {
        for key in &require.source_query_keys {
            if !source.query_keys.iter().any(|k| k == key) {
                out.push(RuleViolation {
                    subject: field.field_id.clone(),
                    change_type: ChangeType::MissingRequiredKey,
                    message: format!(
                        "source {} of field {} is missing query key {key}",
                        source.identity(),
                        field.field_id
                    ),
                    owner: field.owner.clone(),
                    producer: Some(field.source_system.clone()),
                });
            }
        }
    }
}

/// First field owner per producing system, by field id.
fn field_owners(fields: &[FieldLineage]) -> BTreeMap<&SystemId, String> {
    let mut owners = BTreeMap::new();
    for field in fields {
        owners.entry(&field.source_system).or_insert_with(|| field.owner.clone());
    }
    owners
}

fn owner_of(owner_team: &str, fallback: Option<&String>) -> String {
    if owner_team.trim().is_empty() {
        fallback.cloned().unwrap_or_default()
    } else {
        owner_team.to_string()
    }
}
