//! Escalation resolver.
//!
//! Walks producer edges upstream from a service, breadth first, and resolves
//! every system reached to the people who can act on it. Same-depth systems
//! come out in lexicographic order and each system appears once, at the
//! depth it was first reached.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::LineageError;
use crate::model::{Contact, LineageArtifact, SystemId, SystemRegistry};

/// Where a step's contact details came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A registry entry.
    Registry,
    /// Field annotations; the system is not registered.
    Annotation,
}

/// One system in an escalation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationStep {
    /// System to escalate to.
    pub system_id: SystemId,
    /// Registered display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hops from the starting service.
    pub depth: usize,
    /// `upstream_of:<system>`.
    pub reason: String,
    /// Owning team.
    pub owner_team: String,
    /// Ordered contacts.
    pub contacts: Vec<Contact>,
    /// Business flows the system belongs to.
    pub flows: Vec<String>,
    /// Incident runbook; `null` when unknown.
    pub runbook_url: Option<String>,
    /// Documentation root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_root: Option<String>,
    /// Source of the contact details.
    pub resolution: Resolution,
}

/// The chain for one requested service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationChain {
    /// Requested service.
    pub service: SystemId,
    /// Upstream systems in escalation order.
    pub steps: Vec<EscalationStep>,
}

/// Consumer to producers, with parent ids linked at the root level.
struct UpstreamGraph {
    producers_of: BTreeMap<SystemId, BTreeSet<SystemId>>,
}

impl UpstreamGraph {
    fn new(artifact: &LineageArtifact) -> Self {
        let mut producers_of: BTreeMap<SystemId, BTreeSet<SystemId>> = BTreeMap::new();
        for edge in artifact.effective_edges() {
            let consumer_root = edge.consumer.parent().unwrap_or_else(|| edge.consumer.clone());
            let producer_root = edge.producer.parent().unwrap_or_else(|| edge.producer.clone());
            if consumer_root != producer_root {
                producers_of.entry(consumer_root).or_default().insert(producer_root);
            }
            if edge.consumer != edge.producer {
                producers_of.entry(edge.consumer).or_default().insert(edge.producer);
            }
        }
        Self { producers_of }
    }

    /// Direct producers of `id`, including those of its parent.
    fn producers(&self, id: &SystemId) -> impl Iterator<Item = &SystemId> {
        let own = self.producers_of.get(id);
        let inherited = id.parent().and_then(|parent| self.producers_of.get(&parent));
        own.into_iter().chain(inherited).flatten()
    }
}

/// Resolves the escalation chain upstream of `service`.
///
/// The service itself is not part of the chain. `max_depth` bounds the
/// number of hops; zero yields an empty chain.
///
/// # Errors
///
/// Returns [`LineageError::EmptyService`] for a blank service id and
/// [`LineageError::InvalidValue`] for a malformed one.
pub fn escalate(
    service: &str,
    artifact: &LineageArtifact,
    registry: &SystemRegistry,
    max_depth: usize,
) -> Result<Vec<EscalationStep>, LineageError> {
    let start = parse_service(service)?;
    let graph = UpstreamGraph::new(artifact);

    let mut visited: BTreeSet<SystemId> = BTreeSet::new();
    visited.insert(start.clone());
    if let Some(parent) = start.parent() {
        visited.insert(parent);
    }

    let mut steps = Vec::new();
    let mut frontier: BTreeSet<SystemId> = BTreeSet::from([start.clone()]);
    for depth in 1..=max_depth {
        // Producer -> the first (lowest) frontier system that reached it.
        let mut reached: BTreeMap<SystemId, SystemId> = BTreeMap::new();
        for node in &frontier {
            for producer in graph.producers(node) {
                if !visited.contains(producer) {
                    reached.entry(producer.clone()).or_insert_with(|| node.clone());
                }
            }
        }
        if reached.is_empty() {
            break;
        }
        frontier = BTreeSet::new();
        for (id, via) in reached {
            visited.insert(id.clone());
            steps.push(resolve_step(&id, depth, &via, artifact, registry));
            frontier.insert(id);
        }
    }

    tracing::debug!(service = %start, steps = steps.len(), max_depth, "resolved escalation chain");
    Ok(steps)
}

/// Resolves several services independently and in parallel.
///
/// Chains come back in the order the services were given.
///
/// # Errors
///
/// Returns the first error any service produced.
pub fn escalate_all(
    services: &[String],
    artifact: &LineageArtifact,
    registry: &SystemRegistry,
    max_depth: usize,
) -> Result<Vec<EscalationChain>, LineageError> {
    services
        .par_iter()
        .map(|service| {
            let steps = escalate(service, artifact, registry, max_depth)?;
            Ok(EscalationChain { service: parse_service(service)?, steps })
        })
        .collect()
}

fn parse_service(service: &str) -> Result<SystemId, LineageError> {
    if service.trim().is_empty() {
        return Err(LineageError::EmptyService);
    }
    SystemId::parse(service)
}

fn resolve_step(
    id: &SystemId,
    depth: usize,
    via: &SystemId,
    artifact: &LineageArtifact,
    registry: &SystemRegistry,
) -> EscalationStep {
    let reason = format!("upstream_of:{via}");
    let registered = registry
        .lookup(id)
        .or_else(|| artifact.systems.iter().find(|s| &s.id == id))
        .or_else(|| id.parent().and_then(|p| artifact.systems.iter().find(|s| s.id == p)));

    if let Some(system) = registered {
        return EscalationStep {
            system_id: id.clone(),
            name: system.name.clone(),
            depth,
            reason,
            owner_team: system.owner_team.clone(),
            contacts: system.escalation.clone(),
            flows: system.flows.iter().cloned().collect(),
            runbook_url: system.runbook_url.clone(),
            doc_root: system.doc_root.clone(),
            resolution: Resolution::Registry,
        };
    }

    tracing::debug!(system = %id, "system not registered; using annotations");
    let field = artifact
        .fields
        .iter()
        .find(|f| &f.source_system == id)
        .or_else(|| artifact.fields.iter().find(|f| f.source_system.root() == id.root()));
    EscalationStep {
        system_id: id.clone(),
        name: None,
        depth,
        reason,
        owner_team: field.map(|f| f.owner.clone()).unwrap_or_default(),
        contacts: field
            .filter(|f| !f.escalation.trim().is_empty())
            .map(|f| Contact {
                role: "escalation".to_string(),
                name: String::new(),
                channel: f.escalation.clone(),
            })
            .into_iter()
            .collect(),
        flows: Vec::new(),
        runbook_url: None,
        doc_root: None,
        resolution: Resolution::Annotation,
    }
}
