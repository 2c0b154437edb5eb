//! Typed view of a resolved policy pack.
//!
//! Every section defaults, so an empty document is the built-in policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ChangeType, Severity};
use crate::normalize::{scalar_map, RawValues};

/// Reason surfaced when a critical flow forces a block.
pub const DEFAULT_CRITICAL_FLOW_REASON: &str = "critical business flow affected";

/// A policy pack after `extends` and profile merging.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyPack {
    /// Pack id; `builtin` when no pack was selected.
    pub policy_id: String,
    /// Packs this one was layered on.
    pub extends: Vec<String>,
    /// Lineage rules.
    pub lineage: LineagePolicy,
}

/// The `lineage` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LineagePolicy {
    /// Required keys, on top of the base schema.
    pub require: Requirements,
    /// Normalizer defaults overlay.
    #[serde(deserialize_with = "scalar_map")]
    pub defaults: RawValues,
    /// Severity per change type, keyed by wire name.
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Impact gating and flow criticality.
    pub findings: FindingsPolicy,
    /// Named overlays, already applied when a profile was selected.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, serde_json::Value>,
}

impl LineagePolicy {
    /// Policy severity for `change_type`, if the pack sets one.
    #[must_use]
    pub fn severity_override(&self, change_type: ChangeType) -> Option<Severity> {
        self.severity_overrides.get(change_type.as_str()).copied()
    }
}

/// `lineage.require`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Requirements {
    /// Keys every field must declare.
    pub field_keys: Vec<String>,
    /// Query keys every source ref must carry.
    pub source_query_keys: Vec<String>,
    /// Keys every registry system must carry.
    pub system_registry_keys: Vec<String>,
    /// Keys every override must carry.
    pub override_keys: Vec<String>,
}

/// `lineage.findings`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FindingsPolicy {
    /// Severity for items whose reach is unknown.
    pub unknown_impact_severity: Severity,
    /// Handling of items that stay inside the producer.
    pub self_only: SelfOnlyPolicy,
    /// Downstream change types that always block.
    pub block_change_types: Vec<ChangeType>,
    /// Flow-tier escalation.
    pub flow_criticality: FlowCriticality,
}

impl Default for FindingsPolicy {
    fn default() -> Self {
        Self {
            unknown_impact_severity: Severity::Low,
            self_only: SelfOnlyPolicy::default(),
            block_change_types: vec![ChangeType::EnumRemoved],
            flow_criticality: FlowCriticality::default(),
        }
    }
}

/// `lineage.findings.self_only`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelfOnlyPolicy {
    /// Emit findings instead of change events.
    pub emit_finding: bool,
}

/// Which end of the level scale is more critical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelDirection {
    /// Level 1 outranks level 3.
    #[default]
    LowerIsMoreCritical,
    /// Level 3 outranks level 1.
    HigherIsMoreCritical,
}

impl LevelDirection {
    /// Most critical of the given levels.
    #[must_use]
    pub fn most_critical(self, levels: impl IntoIterator<Item = i64>) -> Option<i64> {
        let levels = levels.into_iter();
        match self {
            LevelDirection::LowerIsMoreCritical => levels.min(),
            LevelDirection::HigherIsMoreCritical => levels.max(),
        }
    }

    /// Returns `true` if `level` is at least as critical as `bar`.
    #[must_use]
    pub fn reaches(self, level: i64, bar: i64) -> bool {
        match self {
            LevelDirection::LowerIsMoreCritical => level <= bar,
            LevelDirection::HigherIsMoreCritical => level >= bar,
        }
    }
}

/// `lineage.findings.flow_criticality`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowCriticality {
    /// Master switch.
    pub enabled: bool,
    /// Level ordering.
    pub level_direction: LevelDirection,
    /// Block when the effective level reaches this bar.
    pub fail_on_level: Option<i64>,
    /// Displayed severity per effective level. Keys are level numbers.
    pub severity_by_level: BTreeMap<String, Severity>,
    /// Flows that block whenever touched downstream.
    pub critical_flow_ids: Vec<String>,
    /// Reason surfaced for critical-flow blocks.
    pub critical_flow_block_reason: String,
}

impl Default for FlowCriticality {
    fn default() -> Self {
        Self {
            enabled: false,
            level_direction: LevelDirection::default(),
            fail_on_level: None,
            severity_by_level: BTreeMap::new(),
            critical_flow_ids: Vec::new(),
            critical_flow_block_reason: DEFAULT_CRITICAL_FLOW_REASON.to_string(),
        }
    }
}

impl FlowCriticality {
    /// Severity configured for `level`.
    #[must_use]
    pub fn severity_for(&self, level: i64) -> Option<Severity> {
        self.severity_by_level.get(&level.to_string()).copied()
    }
}
