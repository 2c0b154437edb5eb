//! Canonical per-field lineage record.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::system::SystemId;

/// Declares a closed snake_case vocabulary with `parse`/`as_str`.
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Accepted spellings, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            /// Parses the wire spelling.
            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim() {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Wire spelling.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Upstream source kind.
    SourceKind {
        /// Remote API call.
        Api => "api",
        /// Database read.
        Db => "db",
        /// Consumed event.
        Event => "event",
        /// File input.
        File => "file",
        /// Cache read.
        Cache => "cache",
        /// Request input.
        Input => "input",
    }
}

vocabulary! {
    /// Where a source lives relative to the owning repository.
    SourceScope {
        /// Same repository.
        Internal => "internal",
        /// Another repository in the organization.
        CrossRepo => "cross_repo",
        /// Third-party provider.
        External => "external",
    }
}

impl Default for SourceScope {
    fn default() -> Self {
        SourceScope::Internal
    }
}

vocabulary! {
    /// How the field value is derived from its sources.
    TransformType {
        /// Copied as-is.
        Passthrough => "passthrough",
        /// Normalized representation.
        Normalize => "normalize",
        /// Computed from inputs.
        Derive => "derive",
        /// Aggregated across records.
        Aggregate => "aggregate",
        /// Masked or redacted.
        Mask => "mask",
        /// Joined across sources.
        Join => "join",
    }
}

vocabulary! {
    /// How multiple sources are combined.
    MergeStrategy {
        /// Exactly one source.
        SingleSource => "single_source",
        /// Sources evaluated in priority order.
        Priority => "priority",
        /// First non-null source wins.
        FirstNonNull => "first_non_null",
        /// Values are combined.
        Union => "union",
        /// Service-specific logic.
        Custom => "custom",
    }
}

vocabulary! {
    /// Compatibility promise the producer makes for the field.
    BreakPolicy {
        /// Only additive changes are allowed.
        AdditiveOnly => "additive_only",
        /// Any change is breaking.
        Strict => "strict",
        /// No promise.
        Opaque => "opaque",
    }
}

vocabulary! {
    /// Whether lineage was declared by a human or inferred by tooling.
    Confidence {
        /// Human-declared.
        Declared => "declared",
        /// Tool-inferred.
        Inferred => "inferred",
    }
}

vocabulary! {
    /// Data sensitivity, least to most restrictive.
    DataClassification {
        /// Publicly shareable.
        Public => "public",
        /// Internal only.
        Internal => "internal",
        /// Sensitive data.
        Sensitive => "sensitive",
        /// Regulated data.
        Regulated => "regulated",
    }
}

/// Where an annotation was declared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin {
    /// Forward-slash path relative to the project root.
    pub file: String,
    /// 1-based line.
    #[serde(default)]
    pub line: u32,
}

/// One upstream source feeding a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Source kind.
    pub kind: SourceKind,
    /// Target (API operation, table, topic, ...).
    pub target: String,
    /// Path within the target.
    pub path: String,
    /// Repository scope.
    #[serde(default)]
    pub scope: SourceScope,
    /// Contract reference; always non-empty.
    #[serde(alias = "contract_ref")]
    pub contract: String,
    /// External provider; present iff `scope` is external.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "provider_id")]
    pub provider: Option<String>,
    /// External snapshot date; present iff `scope` is external.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    /// System that produces this source.
    pub upstream_system: SystemId,
    /// Query keys declared on the source ref (for policy requirements).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_keys: Vec<String>,
}

impl Source {
    /// Identity used to pair sources across artifacts.
    #[must_use]
    pub fn identity(&self) -> String {
        [self.kind.as_str(), &self.target, &self.path, self.scope.as_str()].join("|")
    }
}

/// Canonical lineage of one output field, all defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLineage {
    /// Stable identity, unique within an artifact.
    pub field_id: String,
    /// Previous `field_id` when the field was renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
    /// Output field path (e.g. `response.user_id`).
    pub field: String,
    /// Producing system.
    pub source_system: SystemId,
    /// Producer version.
    pub source_version: String,
    /// Oldest producer version the field supports.
    pub min_supported_source_version: String,
    /// Ordered upstream sources.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Transform type.
    #[serde(alias = "transform_type")]
    pub transform: TransformType,
    /// Merge strategy.
    pub merge_strategy: MergeStrategy,
    /// Break policy.
    pub break_policy: BreakPolicy,
    /// Data classification.
    pub data_classification: DataClassification,
    /// Declared or inferred.
    pub confidence: Confidence,
    /// Owning team id.
    pub owner: String,
    /// Escalation ref.
    pub escalation: String,
    /// Contract test id.
    pub contract_test_id: String,
    /// Date the field was introduced.
    pub introduced_at: NaiveDate,
    /// Planned removal date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset_at: Option<NaiveDate>,
    /// Free-text lineage narrative.
    pub flow: String,
    /// Free-text note.
    pub note: String,
    /// Allowed enum values, when the field is an enum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<BTreeSet<String>>,
    /// Declared value type (e.g. `int32`, `string`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Keys filled from the default table rather than declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted: Vec<String>,
    /// Declaration site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl FieldLineage {
    /// Systems this field reads from, excluding itself, sorted and deduped.
    #[must_use]
    pub fn upstream_systems(&self) -> BTreeSet<&SystemId> {
        self.sources
            .iter()
            .map(|s| &s.upstream_system)
            .filter(|up| *up != &self.source_system)
            .collect()
    }

    /// Returns `true` when the key was declared (inline or sidecar).
    #[must_use]
    pub fn declares(&self, key: &str) -> bool {
        if self.defaulted.iter().any(|k| k == key) {
            return false;
        }
        match key {
            "renamed_from" => self.renamed_from.is_some(),
            "sunset_at" => self.sunset_at.is_some(),
            "enum" => self.enum_values.is_some(),
            "value_type" => self.value_type.is_some(),
            "sources" => !self.sources.is_empty(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_round_trips_wire_spelling() {
        assert_eq!(MergeStrategy::parse("first_non_null"), Some(MergeStrategy::FirstNonNull));
        assert_eq!(SourceScope::CrossRepo.as_str(), "cross_repo");
        assert!(TransformType::parse("explode").is_none());
    }

    #[test]
    fn classification_orders_least_to_most_restrictive() {
        assert!(DataClassification::Public < DataClassification::Internal);
        assert!(DataClassification::Sensitive < DataClassification::Regulated);
    }

    #[test]
    fn source_accepts_legacy_key_names() {
        let json = r#"{"kind":"api","target":"identity.GetUser","path":"response.id","contract_ref":"git+https://x@abc","provider_id":"acme","upstream_system":"identity"}"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert_eq!(source.scope, SourceScope::Internal);
        assert_eq!(source.contract, "git+https://x@abc");
        assert_eq!(source.provider.as_deref(), Some("acme"));
        assert_eq!(source.identity(), "api|identity.GetUser|response.id|internal");
    }
}
