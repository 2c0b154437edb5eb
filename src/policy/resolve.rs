//! Policy pack loading, `extends` resolution and profile overlays.
//!
//! Packs are merged as untyped JSON so later packs override earlier ones
//! key-by-key, then the result is read into a typed [`PolicyPack`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::LineageError;
use crate::model::ChangeType;
use crate::normalize::DefaultTable;
use crate::ports::FileSystem;

use super::pack::PolicyPack;

/// Only pack schema this engine reads.
pub const POLICY_SCHEMA_VERSION: i64 = 1;

/// Id reported when no pack was selected.
pub const BUILTIN_POLICY_ID: &str = "builtin";

/// Pack keys that describe the pack itself rather than rules.
const PACK_HEADER_KEYS: [&str; 3] = ["schema_version", "policy_id", "extends"];

/// A policy conflict resolved in favor of the stricter rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CompatibilityNote {
    /// Pack (or `profile:<name>`) that caused the note.
    pub policy_id: String,
    /// What was kept or ignored.
    pub message: String,
}

impl fmt::Display for CompatibilityNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.policy_id, self.message)
    }
}

/// Somewhere raw pack documents can be loaded from by id.
pub trait PackSource {
    /// Loads the raw document for `policy_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::PolicyNotFound`] for unknown ids and parse
    /// errors for malformed documents.
    fn load(&self, policy_id: &str) -> Result<Value, LineageError>;
}

/// In-memory pack source.
#[derive(Debug, Clone, Default)]
pub struct PackLibrary {
    packs: BTreeMap<String, Value>,
}

impl PackLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pack document.
    #[must_use]
    pub fn with_pack(mut self, policy_id: &str, document: Value) -> Self {
        self.packs.insert(policy_id.to_string(), document);
        self
    }

    /// Adds a pack from YAML or JSON text.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the text is malformed.
    pub fn with_text(self, policy_id: &str, text: &str) -> Result<Self, LineageError> {
        let document = parse_document(text, &format!("policy {policy_id}"))?;
        Ok(self.with_pack(policy_id, document))
    }
}

impl PackSource for PackLibrary {
    fn load(&self, policy_id: &str) -> Result<Value, LineageError> {
        self.packs
            .get(policy_id)
            .cloned()
            .ok_or_else(|| LineageError::PolicyNotFound(policy_id.to_string()))
    }
}

/// Packs stored as `<dir>/<policy_id>.yaml|yml|json`.
pub struct DirectoryPackSource<'a> {
    fs: &'a dyn FileSystem,
    dir: PathBuf,
}

impl<'a> DirectoryPackSource<'a> {
    /// Creates a source over `dir`.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, dir: impl AsRef<Path>) -> Self {
        Self { fs, dir: dir.as_ref().to_path_buf() }
    }
}

impl PackSource for DirectoryPackSource<'_> {
    fn load(&self, policy_id: &str) -> Result<Value, LineageError> {
        if policy_id.contains("://") {
            return Err(LineageError::invalid(
                "policy id",
                policy_id,
                "a local pack id (remote packs must be fetched before evaluation)",
            ));
        }
        if policy_id.is_empty() || policy_id.contains("..") || policy_id.contains(['/', '\\']) {
            return Err(LineageError::invalid("policy id", policy_id, "a bare pack id"));
        }
        let path = ["yaml", "yml", "json"]
            .iter()
            .map(|ext| self.dir.join(format!("{policy_id}.{ext}")))
            .find(|path| self.fs.exists(path))
            .ok_or_else(|| LineageError::PolicyNotFound(policy_id.to_string()))?;
        let text = self.fs.read_to_string(&path).map_err(|e| LineageError::read(&path, e))?;
        tracing::debug!(policy_id, path = %path.display(), "loaded policy pack");
        parse_document(&text, &format!("policy {}", path.display()))
    }
}

/// A policy ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    /// Merged, typed pack.
    pub pack: PolicyPack,
    /// Packs in merge order, lowest precedence first.
    pub chain: Vec<String>,
    /// Applied profile.
    pub profile: Option<String>,
    /// Conflicts resolved during merging.
    pub notes: Vec<CompatibilityNote>,
    /// Normalizer defaults with the pack's overlay applied.
    pub defaults: DefaultTable,
}

impl ResolvedPolicy {
    /// The policy used when no pack is selected.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            pack: PolicyPack { policy_id: BUILTIN_POLICY_ID.to_string(), ..PolicyPack::default() },
            chain: Vec::new(),
            profile: None,
            notes: Vec::new(),
            defaults: DefaultTable::standard(),
        }
    }
}

/// Resolves `policy_id` and its `extends` chain, then applies `profile`.
///
/// # Errors
///
/// Returns an error for unknown packs or profiles, `extends` cycles,
/// unsupported schema versions and documents that do not fit the pack
/// shape.
pub fn resolve(
    source: &dyn PackSource,
    policy_id: &str,
    profile: Option<&str>,
) -> Result<ResolvedPolicy, LineageError> {
    let mut ordered = Vec::new();
    let mut stack = Vec::new();
    let mut done = BTreeSet::new();
    collect(source, policy_id, &mut stack, &mut done, &mut ordered)?;

    let mut notes = Vec::new();
    let mut merged = Value::Object(Map::new());
    let mut chain = Vec::with_capacity(ordered.len());
    for (id, document) in ordered {
        let Value::Object(mut body) = document else {
            continue;
        };
        for key in PACK_HEADER_KEYS {
            body.remove(key);
        }
        merge(&mut merged, Value::Object(body), &mut Vec::new(), &id, &mut notes);
        tracing::debug!(policy_id = %id, "merged policy pack");
        chain.push(id);
    }

    if let Some(name) = profile {
        let overlay = merged
            .pointer(&format!("/lineage/profiles/{name}"))
            .cloned()
            .ok_or_else(|| LineageError::UnknownProfile(name.to_string()))?;
        if let Some(lineage) = merged.get_mut("lineage") {
            let mut path = vec!["lineage".to_string()];
            merge(lineage, overlay, &mut path, &format!("profile:{name}"), &mut notes);
        }
        tracing::debug!(profile = name, "applied policy profile");
    }

    let mut pack: PolicyPack = serde_json::from_value(merged)
        .map_err(|e| LineageError::parse(format!("policy {policy_id}"), e))?;
    pack.policy_id = policy_id.to_string();
    pack.extends = chain.iter().filter(|id| id.as_str() != policy_id).cloned().collect();

    for key in pack.lineage.severity_overrides.keys() {
        if ChangeType::parse(key).is_none() {
            notes.push(CompatibilityNote {
                policy_id: policy_id.to_string(),
                message: format!("severity_overrides.{key} names no change type; ignored"),
            });
        }
    }
    let (defaults, refused) = DefaultTable::with_overrides(&pack.lineage.defaults);
    for key in refused {
        notes.push(CompatibilityNote {
            policy_id: policy_id.to_string(),
            message: format!("defaults.{key} cannot be defaulted by policy; base rule kept"),
        });
    }
    notes.sort();
    notes.dedup();
    for note in &notes {
        tracing::warn!(policy_id = %note.policy_id, "{}", note.message);
    }

    Ok(ResolvedPolicy { pack, chain, profile: profile.map(str::to_string), notes, defaults })
}

/// Depth-first walk of `extends`, parents before children.
fn collect(
    source: &dyn PackSource,
    policy_id: &str,
    stack: &mut Vec<String>,
    done: &mut BTreeSet<String>,
    ordered: &mut Vec<(String, Value)>,
) -> Result<(), LineageError> {
    if stack.iter().any(|id| id == policy_id) {
        let mut cycle = stack.clone();
        cycle.push(policy_id.to_string());
        return Err(LineageError::PolicyCycle(cycle.join(" -> ")));
    }
    if done.contains(policy_id) {
        return Ok(());
    }

    let document = match source.load(policy_id)? {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    if !document.is_object() {
        return Err(LineageError::parse(format!("policy {policy_id}"), "expected a mapping"));
    }
    check_schema_version(policy_id, &document)?;

    stack.push(policy_id.to_string());
    for parent in extends_of(policy_id, &document)? {
        collect(source, &parent, stack, done, ordered)?;
    }
    stack.pop();

    done.insert(policy_id.to_string());
    ordered.push((policy_id.to_string(), document));
    Ok(())
}

fn check_schema_version(policy_id: &str, document: &Value) -> Result<(), LineageError> {
    let supported = match document.get("schema_version") {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_i64() == Some(POLICY_SCHEMA_VERSION),
        Some(Value::String(s)) => s.trim() == POLICY_SCHEMA_VERSION.to_string(),
        Some(_) => false,
    };
    if supported {
        return Ok(());
    }
    let found = document.get("schema_version").map(ToString::to_string).unwrap_or_default();
    Err(LineageError::PolicySchema { policy_id: policy_id.to_string(), found })
}

fn extends_of(policy_id: &str, document: &Value) -> Result<Vec<String>, LineageError> {
    match document.get("extends") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(parent)) => Ok(vec![parent.clone()]),
        Some(Value::Array(parents)) => parents
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    LineageError::parse(format!("policy {policy_id}"), "extends entries must be strings")
                })
            })
            .collect(),
        Some(_) => Err(LineageError::parse(
            format!("policy {policy_id}"),
            "extends must be a string or a list",
        )),
    }
}

/// Overlays `overlay` onto `target`.
///
/// Objects merge per key; scalars and arrays replace, except the
/// `lineage.require.*` lists, which union.
fn merge(
    target: &mut Value,
    overlay: Value,
    path: &mut Vec<String>,
    policy_id: &str,
    notes: &mut Vec<CompatibilityNote>,
) {
    if is_requirement_list(path) {
        if let (Value::Array(inherited), Value::Array(added)) = (&mut *target, &overlay) {
            union_requirements(inherited, added, path, policy_id, notes);
            return;
        }
    }
    match (target, overlay) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                path.push(key.clone());
                match existing.get_mut(&key) {
                    Some(slot) => merge(slot, value, path, policy_id, notes),
                    None => {
                        existing.insert(key, value);
                    }
                }
                path.pop();
            }
        }
        (slot, value) => *slot = value,
    }
}

fn is_requirement_list(path: &[String]) -> bool {
    matches!(path, [lineage, require, _] if lineage == "lineage" && require == "require")
}

fn union_requirements(
    inherited: &mut Vec<Value>,
    added: &[Value],
    path: &[String],
    policy_id: &str,
    notes: &mut Vec<CompatibilityNote>,
) {
    for kept in inherited.iter().filter(|v| !added.contains(v)) {
        notes.push(CompatibilityNote {
            policy_id: policy_id.to_string(),
            message: format!(
                "{} omits inherited requirement {}; requirement kept",
                path[1..].join("."),
                kept.as_str().map_or_else(|| kept.to_string(), str::to_string)
            ),
        });
    }
    for value in added {
        if !inherited.contains(value) {
            inherited.push(value.clone());
        }
    }
}

/// Parses YAML or JSON text into a JSON value. Non-string mapping keys
/// become strings.
///
/// # Errors
///
/// Returns [`LineageError::Parse`] naming `what` when the text is malformed.
pub fn parse_document(text: &str, what: &str) -> Result<Value, LineageError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| LineageError::parse(what, e))?;
    serde_json::to_value(yaml).map_err(|e| LineageError::parse(what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryFileSystem;
    use crate::model::Severity;
    use serde_json::json;

    fn make_library() -> PackLibrary {
        PackLibrary::new()
            .with_pack(
                "org",
                json!({
                    "schema_version": 1,
                    "policy_id": "org",
                    "lineage": {
                        "require": {"field_keys": ["owner", "contract_test_id"]},
                        "severity_overrides": {"field_added": "low", "source_added": "info"},
                        "findings": {"unknown_impact_severity": "medium"}
                    }
                }),
            )
            .with_pack(
                "payments",
                json!({
                    "schema_version": 1,
                    "policy_id": "payments",
                    "extends": ["org"],
                    "lineage": {
                        "require": {"field_keys": ["owner", "sources"]},
                        "severity_overrides": {"field_added": "medium"},
                        "profiles": {
                            "strict": {"findings": {"self_only": {"emit_finding": true}}}
                        }
                    }
                }),
            )
    }

    #[test]
    fn later_packs_override_key_by_key() {
        let resolved = resolve(&make_library(), "payments", None).unwrap();
        let lineage = &resolved.pack.lineage;
        assert_eq!(lineage.severity_override(ChangeType::FieldAdded), Some(Severity::Medium));
        assert_eq!(lineage.severity_override(ChangeType::SourceAdded), Some(Severity::Info));
        assert_eq!(lineage.findings.unknown_impact_severity, Severity::Medium);
        assert_eq!(resolved.chain, vec!["org", "payments"]);
        assert_eq!(resolved.pack.extends, vec!["org"]);
    }

    #[test]
    fn requirements_union_and_note_dropped_keys() {
        let resolved = resolve(&make_library(), "payments", None).unwrap();
        assert_eq!(
            resolved.pack.lineage.require.field_keys,
            vec!["owner", "contract_test_id", "sources"]
        );
        assert!(resolved
            .notes
            .iter()
            .any(|n| n.policy_id == "payments" && n.message.contains("contract_test_id")));
    }

    #[test]
    fn profile_overlays_lineage_section() {
        let plain = resolve(&make_library(), "payments", None).unwrap();
        assert!(!plain.pack.lineage.findings.self_only.emit_finding);
        let strict = resolve(&make_library(), "payments", Some("strict")).unwrap();
        assert!(strict.pack.lineage.findings.self_only.emit_finding);
        assert_eq!(strict.profile.as_deref(), Some("strict"));

        let err = resolve(&make_library(), "payments", Some("lenient")).unwrap_err();
        assert!(matches!(err, LineageError::UnknownProfile(name) if name == "lenient"));
    }

    #[test]
    fn extends_cycle_is_an_error() {
        let library = PackLibrary::new()
            .with_pack("a", json!({"extends": ["b"]}))
            .with_pack("b", json!({"extends": "a"}));
        let err = resolve(&library, "a", None).unwrap_err();
        assert!(matches!(err, LineageError::PolicyCycle(chain) if chain == "a -> b -> a"));
    }

    #[test]
    fn shared_ancestor_is_merged_once() {
        let library = PackLibrary::new()
            .with_pack("base", json!({"lineage": {"severity_overrides": {"field_added": "low"}}}))
            .with_pack("left", json!({"extends": ["base"]}))
            .with_pack("right", json!({"extends": ["base"], "lineage": {"severity_overrides": {"field_added": "high"}}}))
            .with_pack("top", json!({"extends": ["left", "right"]}));
        let resolved = resolve(&library, "top", None).unwrap();
        assert_eq!(resolved.chain, vec!["base", "left", "right", "top"]);
        assert_eq!(
            resolved.pack.lineage.severity_override(ChangeType::FieldAdded),
            Some(Severity::High)
        );
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let library = PackLibrary::new().with_pack("v2", json!({"schema_version": 2}));
        assert!(matches!(
            resolve(&library, "v2", None).unwrap_err(),
            LineageError::PolicySchema { .. }
        ));
    }

    #[test]
    fn identity_defaults_are_refused_with_a_note() {
        let library = PackLibrary::new().with_pack(
            "loose",
            json!({"lineage": {"defaults": {"source_system": "legacy", "break_policy": "opaque"}}}),
        );
        let resolved = resolve(&library, "loose", None).unwrap();
        assert!(resolved.notes.iter().any(|n| n.message.contains("defaults.source_system")));
        assert!(!resolved.notes.iter().any(|n| n.message.contains("break_policy")));
    }

    #[test]
    fn directory_source_reads_yaml_and_rejects_urls() {
        let fs = MemoryFileSystem::new().with_file(
            "policies/org.yaml",
            "schema_version: 1\nlineage:\n  findings:\n    flow_criticality:\n      severity_by_level:\n        1: high\n",
        );
        let source = DirectoryPackSource::new(&fs, "policies");
        let resolved = resolve(&source, "org", None).unwrap();
        assert_eq!(
            resolved.pack.lineage.findings.flow_criticality.severity_for(1),
            Some(Severity::High)
        );
        assert!(matches!(
            resolve(&source, "https://policies.example.com/org", None).unwrap_err(),
            LineageError::InvalidValue { .. }
        ));
        assert!(matches!(
            resolve(&source, "missing", None).unwrap_err(),
            LineageError::PolicyNotFound(_)
        ));
    }
}
