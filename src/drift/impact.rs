//! Downstream reachability over the union of two artifacts' edges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::model::{ImpactScope, LineageArtifact, SystemId};

use super::FlowTouch;

/// Consumer graph plus registry knowledge for one diff.
pub struct ImpactGraph<'a> {
    consumers_of: BTreeMap<SystemId, BTreeSet<SystemId>>,
    baseline: &'a LineageArtifact,
    head: &'a LineageArtifact,
}

impl<'a> ImpactGraph<'a> {
    /// Indexes both artifacts' edges by producer.
    #[must_use]
    pub fn new(baseline: &'a LineageArtifact, head: &'a LineageArtifact) -> Self {
        let mut consumers_of: BTreeMap<SystemId, BTreeSet<SystemId>> = BTreeMap::new();
        for edge in baseline.effective_edges().into_iter().chain(head.effective_edges()) {
            consumers_of.entry(edge.producer).or_default().insert(edge.consumer);
        }
        Self { consumers_of, baseline, head }
    }

    /// Every system that transitively consumes `producer`, excluding itself.
    ///
    /// A child id also reaches consumers of its parent.
    #[must_use]
    pub fn consumers(&self, producer: &SystemId) -> Vec<SystemId> {
        let mut seen: BTreeSet<SystemId> = BTreeSet::new();
        let mut queue: VecDeque<SystemId> = VecDeque::new();
        queue.push_back(producer.clone());
        if let Some(parent) = producer.parent() {
            queue.push_back(parent);
        }
        while let Some(current) = queue.pop_front() {
            let Some(consumers) = self.consumers_of.get(&current) else {
                continue;
            };
            for consumer in consumers {
                if consumer != producer && seen.insert(consumer.clone()) {
                    queue.push_back(consumer.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Classifies the reach of a change to a field produced by `producer`.
    #[must_use]
    pub fn scope(&self, producer: &SystemId) -> (ImpactScope, Vec<SystemId>) {
        let consumers = self.consumers(producer);
        if !consumers.is_empty() {
            return (ImpactScope::Downstream, consumers);
        }
        if self.is_registered(producer) {
            (ImpactScope::SelfOnly, consumers)
        } else {
            (ImpactScope::Unknown, consumers)
        }
    }

    fn is_registered(&self, id: &SystemId) -> bool {
        [self.head, self.baseline].iter().any(|artifact| {
            artifact.systems.iter().any(|s| &s.id == id || Some(&s.id) == id.parent().as_ref())
        })
    }

    /// Flows joined from the given systems, head registry first.
    ///
    /// Flows the catalog does not define are kept without a level.
    #[must_use]
    pub fn flows_touched<'s>(&self, systems: impl IntoIterator<Item = &'s SystemId>) -> Vec<FlowTouch> {
        let mut flow_ids: BTreeSet<String> = BTreeSet::new();
        for id in systems {
            let registered = [self.head, self.baseline].into_iter().find_map(|artifact| {
                artifact
                    .systems
                    .iter()
                    .find(|s| &s.id == id)
                    .or_else(|| id.parent().and_then(|p| artifact.systems.iter().find(|s| s.id == p)))
            });
            if let Some(system) = registered {
                flow_ids.extend(system.flows.iter().cloned());
            }
        }
        flow_ids
            .into_iter()
            .map(|flow_id| {
                let level = [self.head, self.baseline]
                    .into_iter()
                    .find_map(|artifact| artifact.flows.iter().find(|f| f.id == flow_id))
                    .map(|flow| flow.level);
                FlowTouch { id: flow_id, level }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Flow, System};

    fn id(raw: &str) -> SystemId {
        SystemId::parse(raw).unwrap()
    }

    fn make_system(raw: &str, flows: &[&str]) -> System {
        System {
            id: id(raw),
            name: None,
            owner_team: String::new(),
            escalation: vec![],
            runbook_url: None,
            doc_root: None,
            flows: flows.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    fn make_artifact(edges: &[(&str, &str)], systems: Vec<System>) -> LineageArtifact {
        LineageArtifact {
            edges: edges
                .iter()
                .map(|(c, p)| Edge { consumer: id(c), producer: id(p), field_ids: vec![] })
                .collect(),
            systems,
            flows: vec![Flow {
                id: "checkout".to_string(),
                name: "Checkout".to_string(),
                level: 1,
                owner: String::new(),
                business_risk: String::new(),
            }],
            ..LineageArtifact::empty()
        }
    }

    #[test]
    fn consumers_are_transitive_and_exclude_producer() {
        let base = make_artifact(&[("checkout", "payments"), ("payments", "ledger")], vec![]);
        let head = make_artifact(&[("ledger", "payments")], vec![]);
        let graph = ImpactGraph::new(&base, &head);
        assert_eq!(graph.consumers(&id("ledger")), vec![id("checkout"), id("payments")]);
    }

    #[test]
    fn scope_falls_back_to_registry_knowledge() {
        let base = make_artifact(&[], vec![make_system("payments", &[])]);
        let head = make_artifact(&[], vec![]);
        let graph = ImpactGraph::new(&base, &head);
        assert_eq!(graph.scope(&id("payments:worker")).0, ImpactScope::SelfOnly);
        assert_eq!(graph.scope(&id("ghost")).0, ImpactScope::Unknown);
    }

    #[test]
    fn flows_join_through_registry() {
        let head = make_artifact(&[], vec![make_system("checkout", &["checkout", "uncatalogued"])]);
        let graph = ImpactGraph::new(&head, &head);
        let flows = graph.flows_touched([&id("checkout")]);
        assert_eq!(
            flows,
            vec![
                FlowTouch { id: "checkout".to_string(), level: Some(1) },
                FlowTouch { id: "uncatalogued".to_string(), level: None },
            ]
        );
    }
}
