//! Turns drift items into findings and a gate decision.
//!
//! A single pass over the items: scope gating, severity resolution, flow
//! criticality, then the gate. Rule violations from the head artifact are
//! folded in as findings with their own severities.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::drift::DriftItem;
use crate::model::{
    ChangeType, EnforcementMode, GateAction, ImpactScope, LineageArtifact, Override, Severity,
    SystemId, Threshold,
};

use super::guidance;
use super::pack::{FindingsPolicy, LineagePolicy};
use super::requirements::{self, RuleViolation};
use super::resolve::{CompatibilityNote, ResolvedPolicy};

/// Threshold and mode for the final gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    /// Lowest severity that gates.
    pub threshold: Threshold,
    /// Block or warn.
    pub mode: EnforcementMode,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self { threshold: Threshold::AtLeast(Severity::High), mode: EnforcementMode::Block }
    }
}

/// Flows reached by a downstream finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowContext {
    /// Touched flow ids.
    pub flow_ids: Vec<String>,
    /// Most critical catalogued level; `None` when no touched flow is catalogued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_level: Option<i64>,
}

/// A policy-evaluated drift item or rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Field id, or a `system:`/`override:` subject.
    pub field_id: String,
    /// Classified kind.
    pub change_type: ChangeType,
    /// Severity after policy.
    pub severity: Severity,
    /// Severity before policy.
    pub base_severity: Severity,
    /// Downstream reach.
    pub impact_scope: ImpactScope,
    /// Contribution to the gate.
    pub gate_action: GateAction,
    /// Suppressed by an active override.
    pub overridden: bool,
    /// What changed.
    pub cause: String,
    /// What it means.
    pub impact: String,
    /// What to do.
    pub remediation: String,
    /// Who owns the fix.
    pub owner: String,
    /// Producing system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<SystemId>,
    /// Downstream consumers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<SystemId>,
    /// Flow criticality context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_context: Option<FlowContext>,
    /// Why the finding gates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Matching override.
    #[serde(rename = "override", skip_serializing_if = "Option::is_none")]
    pub matched_override: Option<Override>,
}

/// A self-only change recorded without a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Affected field.
    pub field_id: String,
    /// Classified kind.
    pub change_type: ChangeType,
    /// Severity after policy overrides.
    pub severity: Severity,
    /// What changed.
    pub message: String,
    /// Suppressed by an active override.
    pub overridden: bool,
}

/// Counts for the summary block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Number of findings.
    pub total: usize,
    /// High findings.
    pub high: usize,
    /// Medium findings.
    pub medium: usize,
    /// Low findings.
    pub low: usize,
    /// Info findings.
    pub info: usize,
    /// Overridden findings.
    pub overridden: usize,
    /// Recorded change events.
    pub change_events: usize,
    /// Overall gate action.
    pub gate_action: GateAction,
}

/// Overall gate decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    /// `block`, `warn` or `none`.
    pub action: GateAction,
    /// Threshold applied.
    pub threshold: Threshold,
    /// Mode applied.
    pub mode: EnforcementMode,
    /// One line per gating finding.
    pub reasons: Vec<String>,
}

impl GateDecision {
    /// Returns `true` when the run must fail.
    #[must_use]
    pub fn blocks(&self) -> bool {
        self.action == GateAction::Block
    }
}

/// Full result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Policy applied.
    pub policy_id: String,
    /// Profile applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Findings sorted by `field_id` then `change_type`.
    pub findings: Vec<Finding>,
    /// Non-blocking self-only changes.
    pub change_events: Vec<ChangeEvent>,
    /// Policy conflicts resolved while merging.
    pub notes: Vec<CompatibilityNote>,
    /// Counts.
    pub summary: Summary,
    /// Gate decision.
    pub gate: GateDecision,
}

/// Evaluates drift items and head-artifact rules against a policy.
///
/// `today` decides which head overrides apply to rule violations; drift
/// items already carry their override state.
#[must_use]
pub fn evaluate(
    items: &[DriftItem],
    head: &LineageArtifact,
    policy: &ResolvedPolicy,
    gate: GateSettings,
    today: NaiveDate,
) -> Evaluation {
    let lineage = &policy.pack.lineage;
    let mut findings = Vec::new();
    let mut change_events = Vec::new();

    for item in items {
        if item.impact_scope == ImpactScope::SelfOnly && !lineage.findings.self_only.emit_finding {
            change_events.push(ChangeEvent {
                field_id: item.field_id.clone(),
                change_type: item.change_type,
                severity: lineage.severity_override(item.change_type).unwrap_or(item.base_severity),
                message: item.message.clone(),
                overridden: item.overridden,
            });
            continue;
        }
        findings.push(evaluate_item(item, lineage, gate));
    }

    let active: Vec<&Override> = head.overrides.iter().filter(|o| o.is_active(today)).collect();
    let removed: BTreeSet<&str> = items
        .iter()
        .filter(|i| i.change_type == ChangeType::FieldRemoved)
        .map(|i| i.field_id.as_str())
        .collect();
    let violations = requirements::check(head, &lineage.require)
        .into_iter()
        .chain(requirements::dangling_overrides(head, &removed));
    for violation in violations {
        findings.push(evaluate_violation(violation, lineage, gate, &active));
    }

    findings.sort_by(|a, b| {
        (&a.field_id, a.change_type.as_str(), &a.cause).cmp(&(&b.field_id, b.change_type.as_str(), &b.cause))
    });
    change_events.sort_by(|a, b| {
        (&a.field_id, a.change_type.as_str()).cmp(&(&b.field_id, b.change_type.as_str()))
    });

    let gate = decide(&findings, gate);
    let summary = summarize(&findings, change_events.len(), gate.action);
    tracing::info!(
        policy_id = %policy.pack.policy_id,
        findings = summary.total,
        change_events = summary.change_events,
        gate = %gate.action,
        "evaluated lineage policy"
    );

    Evaluation {
        policy_id: policy.pack.policy_id.clone(),
        profile: policy.profile.clone(),
        findings,
        change_events,
        notes: policy.notes.clone(),
        summary,
        gate,
    }
}

fn evaluate_item(item: &DriftItem, lineage: &LineagePolicy, gate: GateSettings) -> Finding {
    let policy_severity = lineage.severity_override(item.change_type);
    let mut severity = match item.impact_scope {
        ImpactScope::Unknown => policy_severity.unwrap_or(lineage.findings.unknown_impact_severity),
        ImpactScope::Downstream | ImpactScope::SelfOnly => policy_severity.unwrap_or(item.base_severity),
    };

    let mut forced = Vec::new();
    let mut flow_context = None;
    if item.impact_scope == ImpactScope::Downstream {
        if lineage.findings.block_change_types.contains(&item.change_type) {
            forced.push(format!("{} always blocks downstream", item.change_type));
        }
        if let Some((context, level_severity, reasons)) = flow_criticality(item, &lineage.findings) {
            if let Some(level_severity) = level_severity {
                severity = level_severity;
            }
            forced.extend(reasons);
            flow_context = Some(context);
        }
    }

    let (gate_action, reason) = gate_for(severity, item.overridden, &forced, gate);
    Finding {
        field_id: item.field_id.clone(),
        change_type: item.change_type,
        severity,
        base_severity: item.base_severity,
        impact_scope: item.impact_scope,
        gate_action,
        overridden: item.overridden,
        cause: item.message.clone(),
        impact: guidance::impact(item.change_type, item.impact_scope, &item.consumers),
        remediation: guidance::remediation(item.change_type).to_string(),
        owner: item.owner.clone(),
        producer: Some(item.producer.clone()),
        consumers: item.consumers.clone(),
        flow_context,
        reason,
        matched_override: item.matched_override.clone(),
    }
}

/// Flow context, level severity and force-block reasons for a downstream
/// item. `None` when flow criticality is off or no flow is touched.
///
/// Critical flow ids match every touched flow; levels come only from the
/// catalog.
fn flow_criticality(
    item: &DriftItem,
    findings: &FindingsPolicy,
) -> Option<(FlowContext, Option<Severity>, Vec<String>)> {
    let config = &findings.flow_criticality;
    if !config.enabled {
        return None;
    }
    if item.flows.is_empty() {
        return None;
    }
    let effective_level = config.level_direction.most_critical(item.flows.iter().filter_map(|f| f.level));
    let flow_ids: Vec<String> = item.flows.iter().map(|f| f.id.clone()).collect();

    let mut reasons = Vec::new();
    if let (Some(level), Some(bar)) = (effective_level, config.fail_on_level) {
        if config.level_direction.reaches(level, bar) {
            reasons.push(format!("flow level {level} reaches fail_on_level {bar}"));
        }
    }
    if flow_ids.iter().any(|id| config.critical_flow_ids.contains(id)) {
        reasons.push(config.critical_flow_block_reason.clone());
    }
    let level_severity = effective_level.and_then(|level| config.severity_for(level));
    Some((FlowContext { flow_ids, effective_level }, level_severity, reasons))
}

fn evaluate_violation(
    violation: RuleViolation,
    lineage: &LineagePolicy,
    gate: GateSettings,
    active: &[&Override],
) -> Finding {
    let default = match violation.change_type {
        ChangeType::UnregisteredSystem | ChangeType::UnknownOverrideField => Severity::Low,
        _ => Severity::High,
    };
    let severity = lineage.severity_override(violation.change_type).unwrap_or(default);
    let matched = active
        .iter()
        .find(|o| o.matches(&violation.subject, violation.change_type))
        .map(|o| (*o).clone());
    let overridden = matched.is_some();
    let (gate_action, reason) = gate_for(severity, overridden, &[], gate);
    Finding {
        impact: guidance::impact(violation.change_type, ImpactScope::Unknown, &[]),
        remediation: guidance::remediation(violation.change_type).to_string(),
        field_id: violation.subject,
        change_type: violation.change_type,
        severity,
        base_severity: default,
        impact_scope: ImpactScope::Unknown,
        gate_action,
        overridden,
        cause: violation.message,
        owner: violation.owner,
        producer: violation.producer,
        consumers: Vec::new(),
        flow_context: None,
        reason,
        matched_override: matched,
    }
}

/// Gate contribution of one finding, with the reason it gates.
fn gate_for(
    severity: Severity,
    overridden: bool,
    forced: &[String],
    gate: GateSettings,
) -> (GateAction, Option<String>) {
    if overridden {
        return (GateAction::None, None);
    }
    let reason = if forced.is_empty() {
        gate.threshold
            .is_met_by(severity)
            .then(|| format!("severity {severity} meets threshold {}", gate.threshold))
    } else {
        Some(forced.join("; "))
    };
    match (reason, gate.mode) {
        (None, _) => (GateAction::None, None),
        (Some(reason), EnforcementMode::Block) => (GateAction::Block, Some(reason)),
        (Some(reason), EnforcementMode::Warn) => (GateAction::Warn, Some(reason)),
    }
}

fn decide(findings: &[Finding], gate: GateSettings) -> GateDecision {
    let action = findings.iter().map(|f| f.gate_action).max().unwrap_or(GateAction::None);
    let reasons = findings
        .iter()
        .filter(|f| f.gate_action != GateAction::None)
        .filter_map(|f| {
            f.reason
                .as_ref()
                .map(|reason| format!("{} {} ({}): {reason}", f.field_id, f.change_type, f.severity))
        })
        .collect();
    GateDecision { action, threshold: gate.threshold, mode: gate.mode, reasons }
}

fn summarize(findings: &[Finding], change_events: usize, gate_action: GateAction) -> Summary {
    let mut summary = Summary { total: findings.len(), change_events, gate_action, ..Summary::default() };
    for finding in findings {
        match finding.severity {
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
            Severity::Info => summary.info += 1,
        }
        if finding.overridden {
            summary.overridden += 1;
        }
    }
    summary
}
