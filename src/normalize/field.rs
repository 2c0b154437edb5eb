//! Merge, default and validate a single field annotation.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::defaults::DefaultContext;
use super::record::{RawRecord, RawValues};
use super::sources::parse_sources;
use super::{Diagnostic, DiagnosticCode, NormalizeContext};
use crate::model::{
    BreakPolicy, Confidence, DataClassification, FieldLineage, MergeStrategy, SystemId,
    TransformType,
};

pub(crate) static FIELD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{2,63}$").expect("field id regex is valid"));
static FIELD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-\[\]\.]+$").expect("field path regex is valid"));
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("version regex is valid")
});
pub(crate) static OWNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.-]{2,63}$").expect("owner regex is valid"));
pub(crate) static ESCALATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+:.+$").expect("escalation regex is valid"));
static VALUE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("value type regex is valid"));

const KNOWN_KEYS: &[&str] = &[
    "field_id",
    "renamed_from",
    "field",
    "source_system",
    "source_version",
    "min_supported_source_version",
    "sources",
    "transform",
    "transform_type",
    "merge_strategy",
    "break_policy",
    "data_classification",
    "confidence",
    "owner",
    "escalation",
    "contract_test_id",
    "introduced_at",
    "sunset_at",
    "flow",
    "note",
    "enum",
    "value_type",
];

/// Derives a field id from an output path: `response.user_id` → `response_user_id`.
#[must_use]
pub fn infer_field_id(field: &str) -> String {
    let mut id = String::with_capacity(field.len());
    for c in field.trim().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.ends_with('_') {
            id.push('_');
        }
    }
    id.trim_matches('_').to_string()
}

/// Collects values and errors while one field is assembled.
struct FieldBuilder<'r> {
    values: RawValues,
    defaulted: Vec<String>,
    errors: Vec<(DiagnosticCode, String)>,
    record: &'r RawRecord,
}

impl FieldBuilder<'_> {
    fn declared(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn value_or_default(
        &mut self,
        key: &str,
        ctx: &NormalizeContext<'_>,
        dctx: &DefaultContext<'_>,
    ) -> String {
        if let Some(value) = self.declared(key) {
            return value;
        }
        self.defaulted.push(key.to_string());
        ctx.defaults.value_for(key, dctx).unwrap_or_default()
    }

    fn fail(&mut self, message: String) {
        self.errors.push((DiagnosticCode::InvalidValue, message));
    }

    fn check_pattern(&mut self, key: &str, value: &str, pattern: &Regex) {
        if !pattern.is_match(value) {
            self.fail(format!("{key} {value:?} does not match {}", pattern.as_str()));
        }
    }

    fn vocabulary<T>(
        &mut self,
        key: &str,
        value: &str,
        parse: fn(&str) -> Option<T>,
        valid: &[&str],
    ) -> Option<T> {
        let parsed = parse(value);
        if parsed.is_none() {
            self.fail(format!("{key} {value:?} is not one of {}", valid.join("|")));
        }
        parsed
    }

    fn date(&mut self, key: &str, value: &str) -> Option<NaiveDate> {
        let parsed = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok();
        if parsed.is_none() {
            self.fail(format!("{key} {value:?} is not YYYY-MM-DD"));
        }
        parsed
    }

    fn diagnostics(self, field_id: Option<&str>) -> Vec<Diagnostic> {
        let origin = self.record.origin();
        self.errors
            .into_iter()
            .map(|(code, message)| Diagnostic {
                field_id: field_id.map(str::to_string),
                origin: origin.clone(),
                code,
                message,
            })
            .collect()
    }
}

/// Resolves one raw record into a canonical field.
///
/// Inline values beat sidecar values; absent optional keys come from the
/// default table. Every validation failure is returned, not just the first.
pub(super) fn normalize_field(
    record: &RawRecord,
    ctx: &NormalizeContext<'_>,
) -> Result<FieldLineage, Vec<Diagnostic>> {
    let inline_id = record
        .field_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| record.get("field_id"));
    let lookup_id = inline_id
        .map(str::to_string)
        .or_else(|| record.get("field").map(infer_field_id));

    let mut values = ctx.sidecars.resolve(record.file.as_deref(), lookup_id.as_deref());
    for (key, value) in &record.values {
        if !value.trim().is_empty() {
            values.insert(key.clone(), value.trim().to_string());
        }
    }
    for key in values.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        tracing::debug!(key = %key, file = ?record.file, "ignoring unknown annotation key");
    }

    let mut b = FieldBuilder { values, defaulted: Vec::new(), errors: Vec::new(), record };

    let Some(field_id) = inline_id.map(str::to_string).or_else(|| {
        b.declared("field_id").or_else(|| b.declared("field").map(|f| infer_field_id(&f)))
    }) else {
        b.errors.push((
            DiagnosticCode::MissingFieldId,
            "no field_id and no field to infer it from".to_string(),
        ));
        return Err(b.diagnostics(None));
    };
    b.check_pattern("field_id", &field_id, &FIELD_ID);

    let Some(raw_system) = b.declared("source_system") else {
        b.errors.push((
            DiagnosticCode::MissingSourceSystem,
            "source_system is not declared inline or in any sidecar".to_string(),
        ));
        return Err(b.diagnostics(Some(&field_id)));
    };
    let source_system = match SystemId::parse(&raw_system) {
        Ok(id) => id,
        Err(err) => {
            b.fail(err.to_string());
            return Err(b.diagnostics(Some(&field_id)));
        }
    };

    let field = match b.declared("field") {
        Some(path) => path,
        None => {
            b.defaulted.push("field".to_string());
            field_id.clone()
        }
    };
    b.check_pattern("field", &field, &FIELD_PATH);

    let renamed_from = b.declared("renamed_from");
    if let Some(previous) = &renamed_from {
        b.check_pattern("renamed_from", previous, &FIELD_ID);
        if previous == &field_id {
            b.fail("renamed_from must differ from field_id".to_string());
        }
    }

    let mut sources = match b.declared("sources") {
        Some(raw) => match parse_sources(&raw, &source_system) {
            Ok(sources) => sources,
            Err(errors) => {
                b.errors.extend(errors.into_iter().map(|e| (DiagnosticCode::InvalidSource, e)));
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    sources.sort_by_key(crate::model::Source::identity);

    let source_version = {
        let dctx = DefaultContext {
            field_id: &field_id,
            source_system: &source_system,
            source_version: None,
            source_count: sources.len(),
            registry: ctx.registry,
        };
        b.value_or_default("source_version", ctx, &dctx)
    };
    let dctx = DefaultContext {
        field_id: &field_id,
        source_system: &source_system,
        source_version: Some(&source_version),
        source_count: sources.len(),
        registry: ctx.registry,
    };
    b.check_pattern("source_version", &source_version, &VERSION);
    let min_supported = b.value_or_default("min_supported_source_version", ctx, &dctx);
    b.check_pattern("min_supported_source_version", &min_supported, &VERSION);

    if b.declared("transform").is_none() {
        if let Some(alias) = b.declared("transform_type") {
            b.values.insert("transform".to_string(), alias);
        }
    }
    let transform_raw = b.value_or_default("transform", ctx, &dctx);
    let transform =
        b.vocabulary("transform", &transform_raw, TransformType::parse, TransformType::VALUES);

    let merge_raw = b.value_or_default("merge_strategy", ctx, &dctx);
    let merge_strategy =
        b.vocabulary("merge_strategy", &merge_raw, MergeStrategy::parse, MergeStrategy::VALUES);
    match (merge_strategy, sources.len()) {
        (Some(MergeStrategy::SingleSource), n) if n > 1 => {
            b.fail(format!("merge_strategy single_source cannot combine {n} sources"));
        }
        (Some(strategy), 0) if strategy != MergeStrategy::SingleSource => {
            b.fail(format!("merge_strategy {strategy} needs sources to merge"));
        }
        (Some(strategy), 1) if strategy != MergeStrategy::SingleSource => {
            b.fail(format!("merge_strategy {strategy} needs more than one source"));
        }
        _ => {}
    }

    let break_raw = b.value_or_default("break_policy", ctx, &dctx);
    let break_policy =
        b.vocabulary("break_policy", &break_raw, BreakPolicy::parse, BreakPolicy::VALUES);
    let class_raw = b.value_or_default("data_classification", ctx, &dctx);
    let data_classification = b.vocabulary(
        "data_classification",
        &class_raw,
        DataClassification::parse,
        DataClassification::VALUES,
    );
    let confidence_raw = b.value_or_default("confidence", ctx, &dctx);
    let confidence =
        b.vocabulary("confidence", &confidence_raw, Confidence::parse, Confidence::VALUES);

    let owner = b.value_or_default("owner", ctx, &dctx);
    b.check_pattern("owner", &owner, &OWNER);
    let escalation = b.value_or_default("escalation", ctx, &dctx);
    b.check_pattern("escalation", &escalation, &ESCALATION);
    let contract_test_id = b.value_or_default("contract_test_id", ctx, &dctx);

    let introduced_raw = b.value_or_default("introduced_at", ctx, &dctx);
    let introduced_at = b.date("introduced_at", &introduced_raw);
    let sunset_at = b.declared("sunset_at").and_then(|raw| b.date("sunset_at", &raw));
    if let (Some(introduced), Some(sunset)) = (introduced_at, sunset_at) {
        if sunset < introduced {
            b.fail(format!("sunset_at {sunset} precedes introduced_at {introduced}"));
        }
    }

    let flow = b.value_or_default("flow", ctx, &dctx);
    let note = b.value_or_default("note", ctx, &dctx);

    let enum_values = b.declared("enum").map(|raw| {
        raw.split('|')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
    });
    if enum_values.as_ref().is_some_and(BTreeSet::is_empty) {
        b.fail("enum declares no values".to_string());
    }
    let value_type = b.declared("value_type").map(|v| v.to_ascii_lowercase());
    if let Some(vt) = &value_type {
        b.check_pattern("value_type", vt, &VALUE_TYPE);
    }

    if !b.errors.is_empty() {
        return Err(b.diagnostics(Some(&field_id)));
    }
    let (
        Some(transform),
        Some(merge_strategy),
        Some(break_policy),
        Some(data_classification),
        Some(confidence),
        Some(introduced_at),
    ) = (transform, merge_strategy, break_policy, data_classification, confidence, introduced_at)
    else {
        return Err(b.diagnostics(Some(&field_id)));
    };

    let mut defaulted = std::mem::take(&mut b.defaulted);
    defaulted.sort();
    defaulted.dedup();

    Ok(FieldLineage {
        field_id,
        renamed_from,
        field,
        source_system,
        source_version,
        min_supported_source_version: min_supported,
        sources,
        transform,
        merge_strategy,
        break_policy,
        data_classification,
        confidence,
        owner,
        escalation,
        contract_test_id,
        introduced_at,
        sunset_at,
        flow,
        note,
        enum_values,
        value_type,
        defaulted,
        origin: record.origin(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SystemRegistry;
    use crate::normalize::{DefaultTable, Sidecar, SidecarSet};

    fn run(record: &RawRecord, sidecars: &SidecarSet) -> Result<FieldLineage, Vec<Diagnostic>> {
        let registry = SystemRegistry::default();
        let defaults = DefaultTable::standard();
        let ctx = NormalizeContext { registry: &registry, sidecars, defaults: &defaults };
        normalize_field(record, &ctx)
    }

    #[test]
    fn infers_field_id_from_path() {
        assert_eq!(infer_field_id("response.user_id"), "response_user_id");
        assert_eq!(infer_field_id(" Items[0].SKU "), "items_0_sku");
        assert_eq!(infer_field_id("meta--[tags]..first"), "meta_tags_first");
    }

    #[test]
    fn minimal_record_is_fully_defaulted() {
        let record =
            RawRecord::new([("field", "response.user_id"), ("source_system", "Checkout-Service")]);
        let field = run(&record, &SidecarSet::default()).unwrap();
        assert_eq!(field.field_id, "response_user_id");
        assert_eq!(field.source_system.as_str(), "checkout-service");
        assert_eq!(field.source_version, "unversioned");
        assert_eq!(field.min_supported_source_version, "unversioned");
        assert_eq!(field.merge_strategy, MergeStrategy::SingleSource);
        assert_eq!(field.owner, "team.checkout-service");
        assert_eq!(field.escalation, "slack:#checkout-service-oncall");
        assert_eq!(field.contract_test_id, "response_user_id.contract");
        assert!(field.defaulted.contains(&"owner".to_string()));
        assert!(!field.defaulted.contains(&"field".to_string()));
    }

    #[test]
    fn missing_source_system_is_a_field_diagnostic() {
        let record = RawRecord::new([("field_id", "user_id")]);
        let diags = run(&record, &SidecarSet::default()).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::MissingSourceSystem);
        assert_eq!(diags[0].field_id.as_deref(), Some("user_id"));
    }

    #[test]
    fn sidecar_supplies_source_system_but_inline_wins() {
        let sidecars = SidecarSet::new([Sidecar {
            dir: "svc".to_string(),
            defaults: [("source_system", "billing"), ("owner", "team.sidecar")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fields: std::collections::BTreeMap::new(),
        }]);
        let record = RawRecord::new([("field_id", "invoice_total"), ("owner", "team.inline")])
            .at("svc/api.rs", 4);
        let field = run(&record, &sidecars).unwrap();
        assert_eq!(field.source_system.as_str(), "billing");
        assert_eq!(field.owner, "team.inline");
        assert_eq!(field.origin.unwrap().line, 4);
    }

    #[test]
    fn merge_strategy_must_fit_source_count() {
        let record = RawRecord::new([
            ("field_id", "user_email"),
            ("source_system", "identity"),
            ("merge_strategy", "single_source"),
            ("sources", "db:users#email?contract_ref=a,cache:profile#email?contract_ref=b"),
        ]);
        let diags = run(&record, &SidecarSet::default()).unwrap_err();
        assert!(diags[0].message.contains("single_source"));
    }

    #[test]
    fn merged_strategy_without_sources_is_rejected() {
        let record = RawRecord::new([
            ("field_id", "order_total"),
            ("source_system", "orders"),
            ("merge_strategy", "priority"),
        ]);
        let diags = run(&record, &SidecarSet::default()).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("needs sources"));

        let single = RawRecord::new([("field_id", "order_total"), ("source_system", "orders")]);
        assert_eq!(run(&single, &SidecarSet::default()).unwrap().merge_strategy, MergeStrategy::SingleSource);
    }

    #[test]
    fn free_text_registry_owner_falls_back_to_template() {
        let registry: SystemRegistry = SystemRegistry::new(
            vec![crate::model::System {
                id: SystemId::parse("payments").unwrap(),
                name: None,
                owner_team: "Payments Platform".to_string(),
                escalation: vec![crate::model::Contact {
                    role: "primary".to_string(),
                    name: String::new(),
                    channel: "Payments Oncall".to_string(),
                }],
                runbook_url: None,
                doc_root: None,
                flows: BTreeSet::new(),
            }],
            vec![],
        )
        .unwrap();
        let defaults = DefaultTable::standard();
        let sidecars = SidecarSet::default();
        let ctx = NormalizeContext { registry: &registry, sidecars: &sidecars, defaults: &defaults };
        let record = RawRecord::new([("field_id", "amount_minor"), ("source_system", "payments")]);
        let field = normalize_field(&record, &ctx).unwrap();
        assert_eq!(field.owner, "team.payments");
        assert_eq!(field.escalation, "slack:#payments-oncall");

        let declared = RawRecord::new([
            ("field_id", "amount_minor"),
            ("source_system", "payments"),
            ("owner", "Payments Platform"),
        ]);
        assert!(normalize_field(&declared, &ctx).is_err());
    }

    #[test]
    fn reports_every_invalid_value() {
        let record = RawRecord::new([
            ("field_id", "user_tier"),
            ("source_system", "identity"),
            ("break_policy", "loose"),
            ("data_classification", "secret"),
            ("introduced_at", "2026-05-01"),
            ("sunset_at", "2026-01-01"),
        ]);
        let diags = run(&record, &SidecarSet::default()).unwrap_err();
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn parses_enum_and_transform_alias() {
        let record = RawRecord::new([
            ("field_id", "payment_status"),
            ("source_system", "payments"),
            ("transform_type", "normalize"),
            ("enum", "pending | success"),
        ]);
        let field = run(&record, &SidecarSet::default()).unwrap();
        assert_eq!(field.transform, TransformType::Normalize);
        assert_eq!(field.enum_values.unwrap().len(), 2);
        assert!(!field.defaulted.contains(&"transform".to_string()));
    }
}
