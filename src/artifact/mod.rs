//! Artifact builder.
//!
//! Assembles normalized fields, registry systems and the flow catalog into
//! one [`LineageArtifact`] and materializes consumer→producer edges.

use std::collections::BTreeSet;

pub mod profile;

pub use profile::{to_json_for, ExportProfile};

use crate::error::{LineageError, UnknownFlowRef};
use crate::model::{derive_edges, LineageArtifact, SystemRegistry, ARTIFACT_SCHEMA_VERSION};
use crate::normalize::Normalized;

/// Build switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Keep going when systems reference flows missing from the catalog.
    /// The references then surface as `unknown_flow_id` findings.
    pub tolerate_unknown_flows: bool,
}

/// Systems listing flows absent from the catalog, in registry order.
#[must_use]
pub fn unknown_flow_refs(registry: &SystemRegistry) -> Vec<UnknownFlowRef> {
    let known: BTreeSet<&str> = registry.flows.iter().map(|f| f.id.as_str()).collect();
    registry
        .systems
        .iter()
        .flat_map(|system| {
            system
                .flows
                .iter()
                .filter(|flow| !known.contains(flow.as_str()))
                .map(|flow| UnknownFlowRef {
                    system_id: system.id.to_string(),
                    flow_id: flow.clone(),
                })
        })
        .collect()
}

/// Builds an artifact.
///
/// # Errors
///
/// Returns [`LineageError::UnknownFlowIds`] when a system lists a flow that
/// the catalog does not define, unless `options` tolerates it.
pub fn build(
    normalized: &Normalized,
    registry: &SystemRegistry,
    options: BuildOptions,
) -> Result<LineageArtifact, LineageError> {
    let unknown = unknown_flow_refs(registry);
    if !unknown.is_empty() {
        if !options.tolerate_unknown_flows {
            return Err(LineageError::UnknownFlowIds(unknown));
        }
        tracing::warn!(count = unknown.len(), "keeping unknown flow references");
    }

    let mut systems = registry.systems.clone();
    systems.sort_by(|a, b| a.id.cmp(&b.id));
    let mut flows = registry.flows.clone();
    flows.sort_by(|a, b| a.id.cmp(&b.id));
    let mut fields = normalized.fields.clone();
    fields.sort_by(|a, b| a.field_id.cmp(&b.field_id));

    let edges = derive_edges(&fields);
    tracing::info!(
        fields = fields.len(),
        systems = systems.len(),
        edges = edges.len(),
        "built lineage artifact"
    );

    Ok(LineageArtifact {
        schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
        systems,
        fields,
        edges,
        flows,
        overrides: normalized.overrides.clone(),
    })
}

/// Deterministic export form: pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`LineageError::Serialize`] if encoding fails.
pub fn to_json(artifact: &LineageArtifact) -> Result<String, LineageError> {
    let mut json = serde_json::to_string_pretty(artifact)
        .map_err(|e| LineageError::serialize("lineage artifact", e))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Flow, System, SystemId};
    use crate::normalize::{normalize, DefaultTable, NormalizeContext, RawRecord, SidecarSet};

    fn make_system(id: &str, flows: &[&str]) -> System {
        System {
            id: SystemId::parse(id).unwrap(),
            name: None,
            owner_team: format!("team.{id}"),
            escalation: vec![],
            runbook_url: None,
            doc_root: None,
            flows: flows.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    fn make_flow(id: &str, level: i64) -> Flow {
        Flow {
            id: id.to_string(),
            name: id.to_string(),
            level,
            owner: String::new(),
            business_risk: String::new(),
        }
    }

    fn normalized(registry: &SystemRegistry) -> Normalized {
        let records = vec![
            RawRecord::new([
                ("field_id", "checkout_total"),
                ("source_system", "checkout-service"),
                ("sources", "api:payments.Quote#total?contract_ref=quote-v1&upstream_system=payments-service"),
            ]),
            RawRecord::new([
                ("field_id", "checkout_currency"),
                ("source_system", "checkout-service"),
                ("sources", "api:payments.Quote#currency?contract_ref=quote-v1&upstream_system=payments-service"),
            ]),
            RawRecord::new([("field_id", "quote_total"), ("source_system", "payments-service")]),
        ];
        let sidecars = SidecarSet::default();
        let defaults = DefaultTable::standard();
        normalize(&records, &[], &NormalizeContext { registry, sidecars: &sidecars, defaults: &defaults })
    }

    #[test]
    fn edges_group_fields_by_consumer_and_producer() {
        let registry = SystemRegistry::new(
            vec![make_system("payments-service", &[]), make_system("checkout-service", &["checkout"])],
            vec![make_flow("checkout", 1)],
        )
        .unwrap();
        let artifact = build(&normalized(&registry), &registry, BuildOptions::default()).unwrap();
        assert_eq!(artifact.edges.len(), 1);
        let edge = &artifact.edges[0];
        assert_eq!(edge.consumer.as_str(), "checkout-service");
        assert_eq!(edge.producer.as_str(), "payments-service");
        assert_eq!(edge.field_ids, vec!["checkout_currency", "checkout_total"]);
        assert_eq!(artifact.systems[0].id.as_str(), "checkout-service");
    }

    #[test]
    fn unknown_flow_fails_the_build_unless_tolerated() {
        let registry =
            SystemRegistry::new(vec![make_system("checkout-service", &["checkout"])], vec![]).unwrap();
        let err = build(&normalized(&registry), &registry, BuildOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("unknown_flow_id"));

        let tolerant = BuildOptions { tolerate_unknown_flows: true };
        assert!(build(&normalized(&registry), &registry, tolerant).is_ok());
    }

    #[test]
    fn export_is_byte_stable() {
        let registry = SystemRegistry::default();
        let first = to_json(&build(&normalized(&registry), &registry, BuildOptions::default()).unwrap()).unwrap();
        let second = to_json(&build(&normalized(&registry), &registry, BuildOptions::default()).unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("}\n"));
    }
}
