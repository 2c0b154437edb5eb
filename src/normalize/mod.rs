//! Annotation normalizer.
//!
//! Turns raw adapter records plus sidecar files into canonical
//! [`FieldLineage`] entries. A bad record never aborts the run: it becomes
//! one or more [`Diagnostic`]s and is left out of the result.

mod defaults;
mod field;
mod overrides;
mod record;
mod sidecar;
mod sources;

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::model::{FieldLineage, Origin, Override, SystemRegistry};

pub use defaults::{DefaultTable, BASE_REQUIRED_KEYS, DEFAULTABLE_KEYS};
pub use field::infer_field_id;
pub use record::{AnnotationDocument, RawRecord, RawValues};
pub(crate) use record::scalar_map;
pub use sidecar::{Sidecar, SidecarSet};
pub use sources::{parse_source, parse_sources};

/// Kind of per-record normalization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    /// Neither `field_id` nor `field` was supplied.
    MissingFieldId,
    /// No `source_system` inline or in any sidecar.
    MissingSourceSystem,
    /// A key failed validation.
    InvalidValue,
    /// A source ref failed to parse.
    InvalidSource,
    /// Two records define the same `field_id` differently.
    DuplicateFieldId,
    /// An override annotation is incomplete or malformed.
    InvalidOverride,
}

/// A per-record validation failure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    /// Field the failure belongs to, when known.
    pub field_id: Option<String>,
    /// Declaration site.
    pub origin: Option<Origin>,
    /// Failure kind.
    pub code: DiagnosticCode,
    /// Human-readable detail.
    pub message: String,
}

impl DiagnosticCode {
    /// Snake-case name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::MissingFieldId => "missing_field_id",
            DiagnosticCode::MissingSourceSystem => "missing_source_system",
            DiagnosticCode::InvalidValue => "invalid_value",
            DiagnosticCode::InvalidSource => "invalid_source",
            DiagnosticCode::DuplicateFieldId => "duplicate_field_id",
            DiagnosticCode::InvalidOverride => "invalid_override",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "{}:{}: ", origin.file, origin.line)?;
        }
        write!(f, "{}", self.code.as_str())?;
        if let Some(field_id) = &self.field_id {
            write!(f, " [{field_id}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Read-only inputs shared by every record of a run.
pub struct NormalizeContext<'a> {
    /// Registry snapshot for owner/escalation defaults.
    pub registry: &'a SystemRegistry,
    /// Sidecars of the run.
    pub sidecars: &'a SidecarSet,
    /// Default table, possibly overlaid by policy.
    pub defaults: &'a DefaultTable,
}

/// Normalization output, canonically ordered.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Valid fields sorted by `field_id`.
    pub fields: Vec<FieldLineage>,
    /// Valid overrides sorted by field, change type and expiry.
    pub overrides: Vec<Override>,
    /// Every diagnostic, sorted.
    pub diagnostics: Vec<Diagnostic>,
}

/// Normalizes field and override records.
///
/// Records are processed in parallel; the output is sorted afterwards so
/// the result does not depend on scheduling.
#[must_use]
pub fn normalize(
    records: &[RawRecord],
    override_records: &[RawRecord],
    ctx: &NormalizeContext<'_>,
) -> Normalized {
    let results: Vec<Result<FieldLineage, Vec<Diagnostic>>> =
        records.par_iter().map(|record| field::normalize_field(record, ctx)).collect();

    let mut diagnostics = Vec::new();
    let mut by_id: BTreeMap<String, Vec<FieldLineage>> = BTreeMap::new();
    for result in results {
        match result {
            Ok(field) => by_id.entry(field.field_id.clone()).or_default().push(field),
            Err(diags) => diagnostics.extend(diags),
        }
    }

    let mut fields = Vec::with_capacity(by_id.len());
    for (field_id, copies) in by_id {
        let mut copies = copies.into_iter();
        let Some(first) = copies.next() else {
            continue;
        };
        let rest: Vec<FieldLineage> = copies.collect();
        if rest.iter().all(|other| same_definition(&first, other)) {
            fields.push(first);
            continue;
        }
        tracing::warn!(field_id = %field_id, copies = rest.len() + 1, "conflicting field definitions");
        for copy in std::iter::once(&first).chain(rest.iter()) {
            diagnostics.push(Diagnostic {
                field_id: Some(field_id.clone()),
                origin: copy.origin.clone(),
                code: DiagnosticCode::DuplicateFieldId,
                message: format!("field_id {field_id:?} is defined more than once with different values"),
            });
        }
    }

    let mut overrides = Vec::new();
    for record in override_records {
        match overrides::normalize_override(record) {
            Ok(ov) => overrides.push(ov),
            Err(diags) => diagnostics.extend(diags),
        }
    }
    overrides.sort_by(|a, b| {
        (&a.field_id, &a.change_type, a.expires).cmp(&(&b.field_id, &b.change_type, b.expires))
    });
    overrides.dedup_by(|a, b| {
        a.field_id == b.field_id
            && a.change_type == b.change_type
            && a.expires == b.expires
            && a.reason == b.reason
            && a.ticket == b.ticket
    });

    diagnostics.sort();
    for diag in &diagnostics {
        tracing::debug!(field_id = ?diag.field_id, code = ?diag.code, message = %diag.message, "annotation diagnostic");
    }
    tracing::info!(
        fields = fields.len(),
        overrides = overrides.len(),
        diagnostics = diagnostics.len(),
        "normalized annotations"
    );

    Normalized { fields, overrides, diagnostics }
}

/// Compares two definitions ignoring where they were declared.
fn same_definition(a: &FieldLineage, b: &FieldLineage) -> bool {
    let strip = |f: &FieldLineage| FieldLineage { origin: None, ..f.clone() };
    strip(a) == strip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(records: &[RawRecord], override_records: &[RawRecord]) -> Normalized {
        let registry = SystemRegistry::default();
        let sidecars = SidecarSet::default();
        let defaults = DefaultTable::standard();
        let ctx = NormalizeContext { registry: &registry, sidecars: &sidecars, defaults: &defaults };
        normalize(records, override_records, &ctx)
    }

    fn make_record(field_id: &str, system: &str) -> RawRecord {
        RawRecord::new([("field_id", field_id), ("source_system", system)])
    }

    #[test]
    fn bad_record_does_not_abort_the_run() {
        let records = vec![
            make_record("user_id", "identity"),
            RawRecord::new([("field_id", "orphan_field")]),
            make_record("account_id", "identity"),
        ];
        let out = run(&records, &[]);
        let ids: Vec<_> = out.fields.iter().map(|f| f.field_id.as_str()).collect();
        assert_eq!(ids, vec!["account_id", "user_id"]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::MissingSourceSystem);
    }

    #[test]
    fn identical_duplicates_collapse() {
        let records = vec![
            make_record("user_id", "identity").at("a.rs", 1),
            make_record("user_id", "identity").at("b.rs", 9),
        ];
        let out = run(&records, &[]);
        assert_eq!(out.fields.len(), 1);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn conflicting_duplicates_are_excluded() {
        let records = vec![
            make_record("user_id", "identity").at("a.rs", 1),
            make_record("user_id", "accounts").at("b.rs", 9),
            make_record("email", "identity"),
        ];
        let out = run(&records, &[]);
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out.diagnostics.iter().all(|d| d.code == DiagnosticCode::DuplicateFieldId));
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let records: Vec<RawRecord> = (0..40)
            .map(|i| make_record(&format!("field_{i:03}"), if i % 2 == 0 { "identity" } else { "ledger" }))
            .collect();
        let first = run(&records, &[]);
        let second = run(&records, &[]);
        assert_eq!(
            serde_json::to_string(&first.fields).unwrap(),
            serde_json::to_string(&second.fields).unwrap()
        );
    }

    #[test]
    fn overrides_are_sorted_and_validated() {
        let overrides = vec![
            RawRecord::new([("field_id", "zeta_field"), ("change_type", "*"), ("expires", "2026-01-01"), ("reason", "r")]),
            RawRecord::new([("field_id", "alpha_field"), ("change_type", "field_removed"), ("expires", "2026-01-01"), ("reason", "r")]),
            RawRecord::new([("field_id", "alpha_field")]),
        ];
        let out = run(&[], &overrides);
        assert_eq!(out.overrides.len(), 2);
        assert_eq!(out.overrides[0].field_id, "alpha_field");
        assert_eq!(out.diagnostics.len(), 3);
    }
}
