//! Per-field change classification.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ChangeType, Confidence, FieldLineage, Severity, Source};

/// One classified difference, before impact and overrides are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Classified kind.
    pub change_type: ChangeType,
    /// Default severity.
    pub severity: Severity,
    /// What changed, in words.
    pub message: String,
}

/// Accumulates changes so each change type appears once per field.
#[derive(Default)]
struct Changes(BTreeMap<ChangeType, (Severity, Vec<String>)>);

impl Changes {
    fn push(&mut self, change_type: ChangeType, severity: Severity, message: String) {
        let entry = self.0.entry(change_type).or_insert((severity, Vec::new()));
        entry.0 = entry.0.max(severity);
        entry.1.push(message);
    }

    fn into_vec(self) -> Vec<Change> {
        self.0
            .into_iter()
            .map(|(change_type, (severity, messages))| Change {
                change_type,
                severity,
                message: messages.join("; "),
            })
            .collect()
    }
}

/// Classifies every difference between two definitions of one field.
#[must_use]
pub fn compare_fields(base: &FieldLineage, head: &FieldLineage) -> Vec<Change> {
    let mut out = Changes::default();

    if base.field != head.field {
        out.push(
            ChangeType::FieldPathChanged,
            Severity::Medium,
            format!("field path {} -> {}", base.field, head.field),
        );
    }
    if base.source_system != head.source_system {
        out.push(
            ChangeType::SourceSystemChanged,
            Severity::High,
            format!("source_system {} -> {}", base.source_system, head.source_system),
        );
    }
    if base.break_policy != head.break_policy {
        out.push(
            ChangeType::BreakPolicyChanged,
            Severity::High,
            format!("break_policy {} -> {}", base.break_policy, head.break_policy),
        );
    }
    match head.data_classification.cmp(&base.data_classification) {
        Ordering::Less => out.push(
            ChangeType::ClassificationRelaxed,
            Severity::High,
            format!("data_classification relaxed {} -> {}", base.data_classification, head.data_classification),
        ),
        Ordering::Greater => out.push(
            ChangeType::ClassificationTightened,
            Severity::Info,
            format!("data_classification tightened {} -> {}", base.data_classification, head.data_classification),
        ),
        Ordering::Equal => {}
    }

    compare_value_types(base, head, &mut out);
    compare_min_supported(base, head, &mut out);
    compare_enums(base, head, &mut out);

    if base.source_version != head.source_version {
        out.push(
            ChangeType::SourceVersionChanged,
            Severity::Medium,
            format!("source_version {} -> {}", base.source_version, head.source_version),
        );
    }
    compare_sources(&base.sources, &head.sources, &mut out);

    if base.transform != head.transform {
        out.push(
            ChangeType::TransformChanged,
            Severity::Medium,
            format!("transform {} -> {}", base.transform, head.transform),
        );
    }
    if base.merge_strategy != head.merge_strategy {
        out.push(
            ChangeType::MergeChanged,
            Severity::Medium,
            format!("merge_strategy {} -> {}", base.merge_strategy, head.merge_strategy),
        );
    }
    if base.contract_test_id != head.contract_test_id {
        out.push(
            ChangeType::ContractTestIdChanged,
            Severity::Medium,
            format!("contract_test_id {} -> {}", base.contract_test_id, head.contract_test_id),
        );
    }
    if base.confidence != head.confidence {
        let severity = if head.confidence == Confidence::Inferred {
            Severity::Medium
        } else {
            Severity::Low
        };
        out.push(
            ChangeType::ConfidenceChanged,
            severity,
            format!("confidence {} -> {}", base.confidence, head.confidence),
        );
    }
    if base.sunset_at != head.sunset_at {
        out.push(
            ChangeType::SunsetChanged,
            Severity::Medium,
            format!("sunset_at {} -> {}", show_date(base.sunset_at), show_date(head.sunset_at)),
        );
    }

    compare_metadata(base, head, &mut out);
    out.into_vec()
}

fn show_date(date: Option<chrono::NaiveDate>) -> String {
    date.map_or_else(|| "none".to_string(), |d| d.to_string())
}

fn compare_metadata(base: &FieldLineage, head: &FieldLineage, out: &mut Changes) {
    let mut changed = Vec::new();
    let mut contacts_changed = false;
    for (key, before, after) in [
        ("owner", &base.owner, &head.owner),
        ("escalation", &base.escalation, &head.escalation),
        ("flow", &base.flow, &head.flow),
        ("note", &base.note, &head.note),
    ] {
        if before != after {
            contacts_changed |= matches!(key, "owner" | "escalation");
            changed.push(format!("{key} {before:?} -> {after:?}"));
        }
    }
    if base.introduced_at != head.introduced_at {
        changed.push(format!("introduced_at {} -> {}", base.introduced_at, head.introduced_at));
    }
    if changed.is_empty() {
        return;
    }
    let severity = if contacts_changed { Severity::Low } else { Severity::Info };
    out.push(ChangeType::MetadataChanged, severity, changed.join(", "));
}

fn compare_enums(base: &FieldLineage, head: &FieldLineage, out: &mut Changes) {
    match (&base.enum_values, &head.enum_values) {
        (Some(before), Some(after)) => {
            let removed: Vec<&str> = before.difference(after).map(String::as_str).collect();
            let added: Vec<&str> = after.difference(before).map(String::as_str).collect();
            if !removed.is_empty() {
                out.push(
                    ChangeType::EnumRemoved,
                    Severity::High,
                    format!("enum values removed: {}", removed.join(", ")),
                );
            }
            if !added.is_empty() {
                out.push(
                    ChangeType::EnumAdded,
                    Severity::Medium,
                    format!("enum values added: {}", added.join(", ")),
                );
            }
        }
        (None, Some(after)) => out.push(
            ChangeType::TypeNarrowed,
            Severity::High,
            format!("value restricted to enum [{}]", join_set(after)),
        ),
        (Some(before), None) => out.push(
            ChangeType::TypeWidened,
            Severity::Medium,
            format!("enum [{}] no longer enforced", join_set(before)),
        ),
        (None, None) => {}
    }
}

fn join_set(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn compare_min_supported(base: &FieldLineage, head: &FieldLineage, out: &mut Changes) {
    let (before, after) = (&base.min_supported_source_version, &head.min_supported_source_version);
    match compare_versions(after, before) {
        Ordering::Greater => out.push(
            ChangeType::TypeNarrowed,
            Severity::High,
            format!("min_supported_source_version raised {before} -> {after}"),
        ),
        Ordering::Less => out.push(
            ChangeType::TypeWidened,
            Severity::Medium,
            format!("min_supported_source_version lowered {before} -> {after}"),
        ),
        Ordering::Equal => {}
    }
}

fn compare_value_types(base: &FieldLineage, head: &FieldLineage, out: &mut Changes) {
    let (Some(before), Some(after)) = (&base.value_type, &head.value_type) else {
        return;
    };
    if before == after {
        return;
    }
    if is_widening(before, after) {
        out.push(ChangeType::TypeWidened, Severity::Medium, format!("value_type widened {before} -> {after}"));
    } else {
        out.push(ChangeType::TypeNarrowed, Severity::High, format!("value_type narrowed {before} -> {after}"));
    }
}

/// Splits `int32` into (`int`, 32). Bare family names read as 64-bit.
fn numeric_type(value_type: &str) -> Option<(&str, u32)> {
    let split = value_type.find(|c: char| c.is_ascii_digit()).unwrap_or(value_type.len());
    let (family, bits) = value_type.split_at(split);
    if !matches!(family, "int" | "uint" | "float") {
        return None;
    }
    let bits = if bits.is_empty() { 64 } else { bits.parse().ok()? };
    Some((family, bits))
}

/// Width lattice: same numeric family compares bit width, any scalar widens
/// to `string`, everything else narrows.
fn is_widening(before: &str, after: &str) -> bool {
    match (numeric_type(before), numeric_type(after)) {
        (Some((fb, wb)), Some((fa, wa))) if fb == fa => wa > wb,
        _ => after == "string",
    }
}

/// Dotted, numeric-aware version comparison (`v1.10` > `v1.9`).
///
/// Trailing zero parts are ignored, so `1.0` equals `1`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<String> {
        let mut parts: Vec<String> = v
            .trim_start_matches(['v', 'V'])
            .split(['.', '-', '_'])
            .map(str::to_string)
            .collect();
        while parts.len() > 1 && parts.last().is_some_and(|p| p.parse::<u64>() == Ok(0)) {
            parts.pop();
        }
        parts
    };
    let (pa, pb) = (parts(a), parts(b));
    for (x, y) in pa.iter().zip(pb.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    pa.len().cmp(&pb.len())
}

fn compare_sources(base: &[Source], head: &[Source], out: &mut Changes) {
    let index = |sources: &[Source]| -> BTreeMap<String, Source> {
        sources.iter().map(|s| (s.identity(), s.clone())).collect()
    };
    let (before, after) = (index(base), index(head));

    for (identity, old) in &before {
        let Some(new) = after.get(identity) else {
            out.push(ChangeType::SourceRemoved, Severity::High, format!("source {identity} removed"));
            continue;
        };
        if old.upstream_system != new.upstream_system {
            out.push(
                ChangeType::SourceRemoved,
                Severity::High,
                format!(
                    "source {identity} no longer read from {} (now {})",
                    old.upstream_system, new.upstream_system
                ),
            );
        }
        if old.contract != new.contract {
            out.push(
                ChangeType::ContractChanged,
                Severity::Medium,
                format!("source {identity} contract {} -> {}", old.contract, new.contract),
            );
        }
        if let (Some(was), Some(now)) = (old.as_of, new.as_of) {
            match now.cmp(&was) {
                Ordering::Less => out.push(
                    ChangeType::AsOfRegressed,
                    Severity::High,
                    format!("source {identity} as_of moved back {was} -> {now}"),
                ),
                Ordering::Greater => out.push(
                    ChangeType::AsOfAdvanced,
                    Severity::Info,
                    format!("source {identity} as_of advanced {was} -> {now}"),
                ),
                Ordering::Equal => {}
            }
        }
    }
    for identity in after.keys().filter(|id| !before.contains_key(*id)) {
        out.push(ChangeType::SourceAdded, Severity::Medium, format!("source {identity} added"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BreakPolicy, DataClassification, MergeStrategy, SourceKind, SourceScope, SystemId,
        TransformType,
    };
    use chrono::NaiveDate;

    fn make_field() -> FieldLineage {
        FieldLineage {
            field_id: "payment_status".to_string(),
            renamed_from: None,
            field: "payment.status".to_string(),
            source_system: SystemId::parse("payments-service").unwrap(),
            source_version: "v2".to_string(),
            min_supported_source_version: "v2".to_string(),
            sources: vec![make_source("db", "quote-v1", None)],
            transform: TransformType::Passthrough,
            merge_strategy: MergeStrategy::SingleSource,
            break_policy: BreakPolicy::Strict,
            data_classification: DataClassification::Internal,
            confidence: Confidence::Declared,
            owner: "team.payments".to_string(),
            escalation: "slack:#payments".to_string(),
            contract_test_id: "payment_status.contract".to_string(),
            introduced_at: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            sunset_at: None,
            flow: "from @payments-service".to_string(),
            note: "undocumented".to_string(),
            enum_values: Some(["pending", "success"].iter().map(|s| (*s).to_string()).collect()),
            value_type: Some("string".to_string()),
            defaulted: vec![],
            origin: None,
        }
    }

    fn make_source(target: &str, contract: &str, as_of: Option<&str>) -> Source {
        Source {
            kind: SourceKind::Db,
            target: target.to_string(),
            path: "status".to_string(),
            scope: if as_of.is_some() { SourceScope::External } else { SourceScope::Internal },
            contract: contract.to_string(),
            provider: as_of.map(|_| "acme".to_string()),
            as_of: as_of.map(|d| d.parse().unwrap()),
            upstream_system: SystemId::parse("ledger-service").unwrap(),
            query_keys: vec![],
        }
    }

    fn types(changes: &[Change]) -> Vec<ChangeType> {
        changes.iter().map(|c| c.change_type).collect()
    }

    #[test]
    fn identical_fields_have_no_changes() {
        assert!(compare_fields(&make_field(), &make_field()).is_empty());
    }

    #[test]
    fn enum_value_added_is_medium() {
        let base = make_field();
        let mut head = make_field();
        head.enum_values.as_mut().unwrap().insert("failed".to_string());
        let changes = compare_fields(&base, &head);
        assert_eq!(types(&changes), vec![ChangeType::EnumAdded]);
        assert_eq!(changes[0].severity, Severity::Medium);
    }

    #[test]
    fn enum_value_removed_is_high() {
        let base = make_field();
        let mut head = make_field();
        head.enum_values.as_mut().unwrap().remove("pending");
        let changes = compare_fields(&base, &head);
        assert_eq!(types(&changes), vec![ChangeType::EnumRemoved]);
        assert!(changes[0].message.contains("pending"));
    }

    #[test]
    fn classification_direction_sets_type() {
        let base = make_field();
        let mut head = make_field();
        head.data_classification = DataClassification::Public;
        assert_eq!(types(&compare_fields(&base, &head)), vec![ChangeType::ClassificationRelaxed]);
        head.data_classification = DataClassification::Regulated;
        let changes = compare_fields(&base, &head);
        assert_eq!(types(&changes), vec![ChangeType::ClassificationTightened]);
        assert_eq!(changes[0].severity, Severity::Info);
    }

    #[test]
    fn source_chain_changes() {
        let base = FieldLineage {
            sources: vec![make_source("db", "quote-v1", None), make_source("cache", "c1", None)],
            merge_strategy: MergeStrategy::Priority,
            ..make_field()
        };
        let head = FieldLineage {
            sources: vec![make_source("db", "quote-v2", None), make_source("api", "a1", None)],
            ..base.clone()
        };
        let changes = compare_fields(&base, &head);
        assert_eq!(
            types(&changes),
            vec![ChangeType::ContractChanged, ChangeType::SourceRemoved, ChangeType::SourceAdded]
        );
    }

    #[test]
    fn as_of_moving_backward_is_a_regression() {
        let base = FieldLineage { sources: vec![make_source("fx", "fx-v1", Some("2026-02-01"))], ..make_field() };
        let head = FieldLineage { sources: vec![make_source("fx", "fx-v1", Some("2026-01-01"))], ..make_field() };
        let changes = compare_fields(&base, &head);
        assert_eq!(types(&changes), vec![ChangeType::AsOfRegressed]);
        let changes = compare_fields(&head, &base);
        assert_eq!(types(&changes), vec![ChangeType::AsOfAdvanced]);
    }

    #[test]
    fn metadata_severity_depends_on_contacts() {
        let base = make_field();
        let head = FieldLineage { note: "documented".to_string(), ..make_field() };
        assert_eq!(compare_fields(&base, &head)[0].severity, Severity::Info);
        let head = FieldLineage { owner: "team.other".to_string(), ..make_field() };
        assert_eq!(compare_fields(&base, &head)[0].severity, Severity::Low);
    }

    #[test]
    fn min_supported_version_direction() {
        let base = FieldLineage { min_supported_source_version: "v1.9".to_string(), ..make_field() };
        let head = FieldLineage { min_supported_source_version: "v1.10".to_string(), ..make_field() };
        assert_eq!(types(&compare_fields(&base, &head)), vec![ChangeType::TypeNarrowed]);
        assert_eq!(types(&compare_fields(&head, &base)), vec![ChangeType::TypeWidened]);
    }

    #[test]
    fn trailing_zero_versions_are_equivalent() {
        assert_eq!(compare_versions("1.0", "1"), Ordering::Equal);
        assert_eq!(compare_versions("v2.0.0", "2"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.1", "1"), Ordering::Greater);
        let base = FieldLineage { min_supported_source_version: "1".to_string(), ..make_field() };
        let head = FieldLineage { min_supported_source_version: "1.0".to_string(), ..make_field() };
        assert!(compare_fields(&base, &head).is_empty());
    }

    #[test]
    fn value_type_lattice() {
        assert!(is_widening("int32", "int64"));
        assert!(!is_widening("int64", "int32"));
        assert!(is_widening("bool", "string"));
        assert!(!is_widening("string", "int64"));
        assert!(!is_widening("int32", "float64"));
        assert!(is_widening("float32", "float"));
    }

    #[test]
    fn confidence_downgrade_is_medium() {
        let base = make_field();
        let head = FieldLineage { confidence: Confidence::Inferred, ..make_field() };
        assert_eq!(compare_fields(&base, &head)[0].severity, Severity::Medium);
        assert_eq!(compare_fields(&head, &base)[0].severity, Severity::Low);
    }
}
