//! Severity, change-type and gate vocabulary shared by diff and policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LineageError;

/// How serious a drift item or finding is.
///
/// Variants are declared in ascending order so `Ord` compares by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Low impact.
    Low,
    /// Medium impact.
    Medium,
    /// High impact.
    High,
}

impl Severity {
    /// Every severity, highest first.
    pub const ALL_DESCENDING: [Severity; 4] =
        [Severity::High, Severity::Medium, Severity::Low, Severity::Info];

    /// Snake-case name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LineageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(LineageError::invalid("severity", raw, "high|medium|low|info")),
        }
    }
}

/// Gate threshold: a severity, or `none` to never fail on severity alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Fail when a finding meets or exceeds this severity.
    AtLeast(Severity),
    /// Never fail on severity.
    None,
}

impl Threshold {
    /// Returns `true` if `severity` meets or exceeds this threshold.
    #[must_use]
    pub fn is_met_by(self, severity: Severity) -> bool {
        match self {
            Threshold::AtLeast(min) => severity >= min,
            Threshold::None => false,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::AtLeast(sev) => sev.fmt(f),
            Threshold::None => f.write_str("none"),
        }
    }
}

impl Serialize for Threshold {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Threshold {
    type Err = LineageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().eq_ignore_ascii_case("none") {
            return Ok(Threshold::None);
        }
        raw.parse::<Severity>()
            .map(Threshold::AtLeast)
            .map_err(|_| LineageError::invalid("threshold", raw, "high|medium|low|info|none"))
    }
}

/// Whether a blocking gate actually fails the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Findings at or above threshold fail the run.
    Block,
    /// Findings are reported but the run never fails.
    Warn,
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnforcementMode::Block => "block",
            EnforcementMode::Warn => "warn",
        })
    }
}

impl FromStr for EnforcementMode {
    type Err = LineageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(EnforcementMode::Block),
            "warn" => Ok(EnforcementMode::Warn),
            _ => Err(LineageError::invalid("mode", raw, "block|warn")),
        }
    }
}

/// Gate participation of a single finding, and of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// Does not affect the gate.
    #[default]
    None,
    /// Reported as a warning.
    Warn,
    /// Blocks the release.
    Block,
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GateAction::None => "none",
            GateAction::Warn => "warn",
            GateAction::Block => "block",
        })
    }
}

/// Whether drift reaches systems other than the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactScope {
    /// At least one consuming system is reachable.
    Downstream,
    /// No consumer besides the producer itself.
    SelfOnly,
    /// Reachability could not be determined.
    Unknown,
}

/// Classified kind of drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Field present only in the baseline.
    FieldRemoved,
    /// Field present only in the head.
    FieldAdded,
    /// Head field declares `renamed_from` a baseline field.
    FieldRenamed,
    /// Output field path moved.
    FieldPathChanged,
    /// Producing system changed.
    SourceSystemChanged,
    /// Break policy changed.
    BreakPolicyChanged,
    /// Data classification became less restrictive.
    ClassificationRelaxed,
    /// Data classification became more restrictive.
    ClassificationTightened,
    /// Value domain or supported source range shrank.
    TypeNarrowed,
    /// Value domain or supported source range grew.
    TypeWidened,
    /// An allowed enum value was removed.
    EnumRemoved,
    /// An allowed enum value was added.
    EnumAdded,
    /// A source contract reference changed.
    ContractChanged,
    /// Producer source version changed.
    SourceVersionChanged,
    /// A source left the merge chain.
    SourceRemoved,
    /// A source joined the merge chain.
    SourceAdded,
    /// Transform type changed.
    TransformChanged,
    /// Merge strategy changed.
    MergeChanged,
    /// Contract test reference changed.
    ContractTestIdChanged,
    /// Declared/inferred confidence changed.
    ConfidenceChanged,
    /// Sunset date changed.
    SunsetChanged,
    /// Only owner, escalation, flow narrative or note changed.
    MetadataChanged,
    /// External snapshot date moved backward.
    AsOfRegressed,
    /// External snapshot date moved forward.
    AsOfAdvanced,
    /// A policy-required key is absent.
    MissingRequiredKey,
    /// A system references a flow missing from the catalog.
    UnknownFlowId,
    /// A producing system has no registry entry.
    UnregisteredSystem,
    /// An override names a field neither artifact defines.
    UnknownOverrideField,
}

impl ChangeType {
    /// Every change type, in declaration order.
    pub const ALL: [ChangeType; 28] = [
        ChangeType::FieldRemoved,
        ChangeType::FieldAdded,
        ChangeType::FieldRenamed,
        ChangeType::FieldPathChanged,
        ChangeType::SourceSystemChanged,
        ChangeType::BreakPolicyChanged,
        ChangeType::ClassificationRelaxed,
        ChangeType::ClassificationTightened,
        ChangeType::TypeNarrowed,
        ChangeType::TypeWidened,
        ChangeType::EnumRemoved,
        ChangeType::EnumAdded,
        ChangeType::ContractChanged,
        ChangeType::SourceVersionChanged,
        ChangeType::SourceRemoved,
        ChangeType::SourceAdded,
        ChangeType::TransformChanged,
        ChangeType::MergeChanged,
        ChangeType::ContractTestIdChanged,
        ChangeType::ConfidenceChanged,
        ChangeType::SunsetChanged,
        ChangeType::MetadataChanged,
        ChangeType::AsOfRegressed,
        ChangeType::AsOfAdvanced,
        ChangeType::MissingRequiredKey,
        ChangeType::UnknownFlowId,
        ChangeType::UnregisteredSystem,
        ChangeType::UnknownOverrideField,
    ];

    /// Snake-case name, matching override `change_type` and policy keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::FieldRemoved => "field_removed",
            ChangeType::FieldAdded => "field_added",
            ChangeType::FieldRenamed => "field_renamed",
            ChangeType::FieldPathChanged => "field_path_changed",
            ChangeType::SourceSystemChanged => "source_system_changed",
            ChangeType::BreakPolicyChanged => "break_policy_changed",
            ChangeType::ClassificationRelaxed => "classification_relaxed",
            ChangeType::ClassificationTightened => "classification_tightened",
            ChangeType::TypeNarrowed => "type_narrowed",
            ChangeType::TypeWidened => "type_widened",
            ChangeType::EnumRemoved => "enum_removed",
            ChangeType::EnumAdded => "enum_added",
            ChangeType::ContractChanged => "contract_changed",
            ChangeType::SourceVersionChanged => "source_version_changed",
            ChangeType::SourceRemoved => "source_removed",
            ChangeType::SourceAdded => "source_added",
            ChangeType::TransformChanged => "transform_changed",
            ChangeType::MergeChanged => "merge_changed",
            ChangeType::ContractTestIdChanged => "contract_test_id_changed",
            ChangeType::ConfidenceChanged => "confidence_changed",
            ChangeType::SunsetChanged => "sunset_changed",
            ChangeType::MetadataChanged => "metadata_changed",
            ChangeType::AsOfRegressed => "as_of_regressed",
            ChangeType::AsOfAdvanced => "as_of_advanced",
            ChangeType::MissingRequiredKey => "missing_required_key",
            ChangeType::UnknownFlowId => "unknown_flow_id",
            ChangeType::UnregisteredSystem => "unregistered_system",
            ChangeType::UnknownOverrideField => "unknown_override_field",
        }
    }

    /// Parses a snake-case change type name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|ct| ct.as_str() == raw)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
