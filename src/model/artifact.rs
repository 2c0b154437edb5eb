//! The lineage artifact: the durable unit of storage, export and diff.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::field::FieldLineage;
use super::overrides::Override;
use super::system::{Flow, System, SystemId, SystemRegistry};

/// Current artifact schema version.
pub const ARTIFACT_SCHEMA_VERSION: &str = "1";

fn default_schema_version() -> String {
    ARTIFACT_SCHEMA_VERSION.to_string()
}

/// Consumer→producer link materialized from field sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// System whose fields read from `producer`.
    pub consumer: SystemId,
    /// Upstream system.
    pub producer: SystemId,
    /// Consumer fields carried by this link, sorted.
    #[serde(default)]
    pub field_ids: Vec<String>,
}

/// Immutable, versioned lineage snapshot.
///
/// New optional members must default on read so older artifacts keep
/// loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageArtifact {
    /// Schema version, `"1"`.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Registry systems, sorted by id.
    #[serde(default)]
    pub systems: Vec<System>,
    /// Fields, sorted by `field_id`.
    #[serde(default)]
    pub fields: Vec<FieldLineage>,
    /// Derived consumer→producer links.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Flow catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<Flow>,
    /// Drift overrides declared alongside the annotations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Override>,
}

impl LineageArtifact {
    /// An empty artifact at the current schema version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_version: default_schema_version(),
            systems: Vec::new(),
            fields: Vec::new(),
            edges: Vec::new(),
            flows: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Field lookup by id.
    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<&FieldLineage> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    /// The embedded systems and flows as a registry view.
    #[must_use]
    pub fn registry(&self) -> SystemRegistry {
        SystemRegistry { systems: self.systems.clone(), flows: self.flows.clone() }
    }

    /// Edges, recomputed from fields when the artifact carries none.
    #[must_use]
    pub fn effective_edges(&self) -> Vec<Edge> {
        if self.edges.is_empty() {
            derive_edges(&self.fields)
        } else {
            self.edges.clone()
        }
    }
}

/// Groups fields by consuming system and upstream producer.
#[must_use]
pub fn derive_edges(fields: &[FieldLineage]) -> Vec<Edge> {
    let mut grouped: BTreeMap<(SystemId, SystemId), BTreeSet<String>> = BTreeMap::new();
    for field in fields {
        for upstream in field.upstream_systems() {
            grouped
                .entry((field.source_system.clone(), upstream.clone()))
                .or_default()
                .insert(field.field_id.clone());
        }
    }
    grouped
        .into_iter()
        .map(|((consumer, producer), ids)| Edge {
            consumer,
            producer,
            field_ids: ids.into_iter().collect(),
        })
        .collect()
}
