//! Export profiles: the canonical artifact plus alias keys for tools that
//! speak OpenTelemetry, OpenLineage, OpenAPI or AsyncAPI vocabulary.
//!
//! Aliases are additive. Every profile still loads back as the canonical
//! artifact because unknown keys are ignored on read.

use serde_json::{Map, Value};

use crate::error::LineageError;
use crate::model::{FieldLineage, LineageArtifact, Source};

/// Alias set added to exported fields and sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportProfile {
    /// Canonical keys only.
    #[default]
    Canonical,
    /// OpenLineage job names and versions.
    #[value(name = "openlineage")]
    OpenLineage,
    /// OpenTelemetry resource attributes.
    #[value(alias = "opentelemetry")]
    Otel,
    /// OpenAPI field paths.
    #[value(name = "openapi")]
    OpenApi,
    /// AsyncAPI field paths.
    #[value(name = "asyncapi")]
    AsyncApi,
}

impl ExportProfile {
    /// Wire name, written to `export_profile`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExportProfile::Canonical => "canonical",
            ExportProfile::OpenLineage => "openlineage",
            ExportProfile::Otel => "otel",
            ExportProfile::OpenApi => "openapi",
            ExportProfile::AsyncApi => "asyncapi",
        }
    }
}

/// Exports `artifact` under `profile`: pretty JSON with a trailing newline.
///
/// The canonical profile is byte-identical to [`super::to_json`].
///
/// # Errors
///
/// Returns [`LineageError::Serialize`] if encoding fails.
pub fn to_json_for(artifact: &LineageArtifact, profile: ExportProfile) -> Result<String, LineageError> {
    if profile == ExportProfile::Canonical {
        return super::to_json(artifact);
    }
    let mut document =
        serde_json::to_value(artifact).map_err(|e| LineageError::serialize("lineage artifact", e))?;
    if let Value::Object(root) = &mut document {
        root.insert("export_profile".to_string(), Value::from(profile.as_str()));
        if let Some(Value::Array(fields)) = root.get_mut("fields") {
            for (entry, field) in fields.iter_mut().zip(&artifact.fields) {
                if let Value::Object(entry) = entry {
                    alias_field(entry, field, profile);
                }
            }
        }
    }
    let mut json = serde_json::to_string_pretty(&document)
        .map_err(|e| LineageError::serialize("lineage artifact", e))?;
    json.push('\n');
    Ok(json)
}

fn alias_field(entry: &mut Map<String, Value>, field: &FieldLineage, profile: ExportProfile) {
    let system = field.source_system.to_string();
    let mut set = |key: &str, value: &str| {
        entry.insert(key.to_string(), Value::from(value));
    };
    set("field_path", &field.field);
    set("service_name", &system);
    set("service_version", &field.source_version);
    set("spec_version", &field.source_version);
    set("owner_team", &field.owner);

    match profile {
        ExportProfile::Otel => {
            set("service.name", &system);
            set("service.version", &field.source_version);
            set("owner.team", &field.owner);
        }
        ExportProfile::OpenLineage => {
            set("openlineage_job_name", &system);
            set("openlineage.job.name", &system);
            set("openlineage_job_version", &field.source_version);
            set("openlineage.job.version", &field.source_version);
        }
        ExportProfile::OpenApi => set("openapi_field_path", &field.field),
        ExportProfile::AsyncApi => set("asyncapi_field_path", &field.field),
        ExportProfile::Canonical => {}
    }

    if let Some(Value::Array(sources)) = entry.get_mut("sources") {
        for (entry, source) in sources.iter_mut().zip(&field.sources) {
            if let Value::Object(entry) = entry {
                alias_source(entry, source);
            }
        }
    }
}

fn alias_source(entry: &mut Map<String, Value>, source: &Source) {
    for key in ["schema_ref", "spec_ref", "contract_uri", "schema_url"] {
        entry.insert(key.to_string(), Value::from(source.contract.as_str()));
    }
    if let Some(provider) = &source.provider {
        entry.insert("provider".to_string(), Value::from(provider.as_str()));
    }
    entry.insert("upstream_service".to_string(), Value::from(source.upstream_system.to_string()));
    if let Some(as_of) = source.as_of {
        let date = as_of.format("%Y-%m-%d").to_string();
        entry.insert("asof".to_string(), Value::from(date.as_str()));
        entry.insert("snapshot_as_of".to_string(), Value::from(date));
    }
}
