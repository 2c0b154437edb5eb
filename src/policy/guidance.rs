//! Plain-language impact and remediation text for findings.

use crate::model::{ChangeType, ImpactScope, SystemId};

/// What the change means for consumers.
#[must_use]
pub fn impact(change_type: ChangeType, scope: ImpactScope, consumers: &[SystemId]) -> String {
    let what = match change_type {
        ChangeType::FieldRemoved => "Consumers reading this field will get nothing",
        ChangeType::FieldAdded => "A new field is exposed and becomes part of the contract",
        ChangeType::FieldRenamed => "Consumers addressing the old field id must follow the rename",
        ChangeType::FieldPathChanged => "Consumers reading the old path will miss the value",
        ChangeType::SourceSystemChanged => "The field is now produced by a different system",
        ChangeType::BreakPolicyChanged => "The compatibility promise for this field changed",
        ChangeType::ClassificationRelaxed => "Data may now flow to places its old classification forbade",
        ChangeType::ClassificationTightened => "Existing consumers may no longer be allowed to read this data",
        ChangeType::TypeNarrowed => "Values accepted before may now be rejected",
        ChangeType::TypeWidened => "Consumers may receive values they cannot represent",
        ChangeType::EnumRemoved => "Consumers matching on the removed values will break",
        ChangeType::EnumAdded => "Consumers with exhaustive matches may not handle the new values",
        ChangeType::ContractChanged => "The upstream contract backing this field changed",
        ChangeType::SourceVersionChanged => "The field now comes from a different source version",
        ChangeType::SourceRemoved => "The field lost one of its upstream inputs",
        ChangeType::SourceAdded => "The field gained an upstream dependency",
        ChangeType::TransformChanged => "Values are computed differently",
        ChangeType::MergeChanged => "Multiple sources are combined differently",
        ChangeType::ContractTestIdChanged => "Contract test coverage moved to a different test",
        ChangeType::ConfidenceChanged => "The lineage record is trusted differently",
        ChangeType::SunsetChanged => "The retirement date of this field changed",
        ChangeType::MetadataChanged => "Descriptive lineage metadata changed",
        ChangeType::AsOfRegressed => "An external source snapshot moved backwards in time",
        ChangeType::AsOfAdvanced => "An external source snapshot was refreshed",
        ChangeType::MissingRequiredKey => "Lineage records are incomplete for policy review",
        ChangeType::UnknownFlowId => "Flow criticality cannot be evaluated for this system",
        ChangeType::UnregisteredSystem => "Nobody can be escalated to for this system",
        ChangeType::UnknownOverrideField => "The override suppresses nothing and hides a stale exception",
    };
    match scope {
        ImpactScope::Downstream => {
            let names: Vec<&str> = consumers.iter().map(SystemId::as_str).collect();
            format!("{what}. Affects {}.", names.join(", "))
        }
        ImpactScope::SelfOnly => format!("{what}. No downstream consumers are known."),
        ImpactScope::Unknown => format!("{what}. Downstream reach could not be determined."),
    }
}

/// What the owner should do about it.
#[must_use]
pub fn remediation(change_type: ChangeType) -> &'static str {
    match change_type {
        ChangeType::FieldRemoved | ChangeType::EnumRemoved | ChangeType::SourceSystemChanged => {
            "Coordinate with consumers before release or add a time-boxed override with a ticket."
        }
        ChangeType::FieldRenamed | ChangeType::FieldPathChanged => {
            "Keep the old name available until consumers migrate."
        }
        ChangeType::TypeNarrowed | ChangeType::TypeWidened | ChangeType::EnumAdded => {
            "Confirm consumers handle the new value range and update contract tests."
        }
        ChangeType::ClassificationRelaxed | ChangeType::ClassificationTightened => {
            "Get data governance sign-off for the new classification."
        }
        ChangeType::BreakPolicyChanged | ChangeType::ContractChanged => {
            "Review the contract change with consumers and version it."
        }
        ChangeType::SourceRemoved
        | ChangeType::SourceAdded
        | ChangeType::SourceVersionChanged
        | ChangeType::TransformChanged
        | ChangeType::MergeChanged => "Verify derived values with the field's contract test.",
        ChangeType::AsOfRegressed => "Re-point the source at the current snapshot.",
        ChangeType::MissingRequiredKey => "Declare the missing key in the annotation, sidecar or registry.",
        ChangeType::UnknownFlowId => "Add the flow to the flow catalog or remove the reference.",
        ChangeType::UnregisteredSystem => "Register the system with an owner team and contacts.",
        ChangeType::UnknownOverrideField => "Fix the override's field_id or delete the override.",
        ChangeType::FieldAdded
        | ChangeType::ContractTestIdChanged
        | ChangeType::ConfidenceChanged
        | ChangeType::SunsetChanged
        | ChangeType::MetadataChanged
        | ChangeType::AsOfAdvanced => "No action needed beyond review.",
    }
}
