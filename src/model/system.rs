//! System identity, registry entries and the flow catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LineageError;

/// Hierarchical system identifier, `parent` or `parent:child`.
///
/// Stored trimmed and lowercased. `payments` and `payments:worker` are
/// distinct keys; [`SystemId::parent`] relates them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId(String);

impl SystemId {
    /// Parses and normalizes a system id.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is empty or a component is not
    /// `[A-Za-z][A-Za-z0-9_-]{0,63}`.
    pub fn parse(raw: &str) -> Result<Self, LineageError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let mut parts = normalized.splitn(2, ':');
        let root = parts.next().unwrap_or_default();
        let valid = valid_component(root) && parts.next().map_or(true, valid_component);
        if !valid {
            return Err(LineageError::invalid(
                "system id",
                raw,
                "parent[:child] with components like [A-Za-z][A-Za-z0-9_-]*",
            ));
        }
        Ok(Self(normalized))
    }

    /// The full id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The top-level component.
    #[must_use]
    pub fn root(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(root, _)| root)
    }

    /// The child component, if any.
    #[must_use]
    pub fn child(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, child)| child)
    }

    /// The parent id when this id has a child component.
    #[must_use]
    pub fn parent(&self) -> Option<SystemId> {
        self.child().map(|_| SystemId(self.root().to_string()))
    }
}

fn valid_component(part: &str) -> bool {
    let mut chars = part.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && part.len() <= 64
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl TryFrom<String> for SystemId {
    type Error = LineageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SystemId::parse(&value)
    }
}

impl From<SystemId> for String {
    fn from(value: SystemId) -> Self {
        value.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One escalation contact for a system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Contact {
    /// Role in the escalation (e.g. "primary", "owner").
    #[serde(default)]
    pub role: String,
    /// Person or rotation name.
    #[serde(default)]
    pub name: String,
    /// Typed channel ref (e.g. "pagerduty:payments").
    #[serde(default)]
    pub channel: String,
}

/// A registered system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Hierarchical id.
    pub id: SystemId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning team.
    #[serde(default)]
    pub owner_team: String,
    /// Ordered escalation contacts.
    #[serde(default)]
    pub escalation: Vec<Contact>,
    /// Incident runbook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    /// Documentation root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_root: Option<String>,
    /// Business flows this system belongs to.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flows: BTreeSet<String>,
}

impl System {
    /// Returns `true` when the named registry key carries a value.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        match key {
            "id" => true,
            "name" => self.name.as_deref().is_some_and(|v| !v.trim().is_empty()),
            "owner_team" => !self.owner_team.trim().is_empty(),
            "escalation" => !self.escalation.is_empty(),
            "runbook_url" => self.runbook_url.as_deref().is_some_and(|v| !v.trim().is_empty()),
            "doc_root" => self.doc_root.as_deref().is_some_and(|v| !v.trim().is_empty()),
            "flows" => !self.flows.is_empty(),
            _ => false,
        }
    }
}

/// A business flow with an organization-defined criticality level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Unique flow id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Criticality level; direction is configured by policy.
    pub level: i64,
    /// Owning team.
    #[serde(default)]
    pub owner: String,
    /// Plain-language business risk.
    #[serde(default)]
    pub business_risk: String,
}

/// Registry document: systems plus an optional flow catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRegistry {
    /// Registered systems.
    #[serde(default)]
    pub systems: Vec<System>,
    /// Flow catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<Flow>,
}

impl SystemRegistry {
    /// Builds a registry, rejecting duplicate system and flow ids.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Registry`] when an id appears twice.
    pub fn new(mut systems: Vec<System>, mut flows: Vec<Flow>) -> Result<Self, LineageError> {
        let mut seen = BTreeSet::new();
        for system in &systems {
            if !seen.insert(system.id.clone()) {
                return Err(LineageError::Registry(format!("duplicate system id {:?}", system.id.as_str())));
            }
        }
        let mut seen_flows = BTreeSet::new();
        for flow in &flows {
            if flow.id.trim().is_empty() {
                return Err(LineageError::Registry("flow catalog contains empty id".to_string()));
            }
            if !seen_flows.insert(flow.id.clone()) {
                return Err(LineageError::Registry(format!("duplicate flow id {:?}", flow.id)));
            }
        }
        systems.sort_by(|a, b| a.id.cmp(&b.id));
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { systems, flows })
    }

    /// Exact registry lookup.
    #[must_use]
    pub fn get(&self, id: &SystemId) -> Option<&System> {
        self.systems.iter().find(|s| &s.id == id)
    }

    /// Lookup that falls back from `parent:child` to `parent`.
    #[must_use]
    pub fn lookup(&self, id: &SystemId) -> Option<&System> {
        self.get(id).or_else(|| id.parent().and_then(|parent| self.get(&parent)))
    }

    /// Flow catalog indexed by id.
    #[must_use]
    pub fn flow_index(&self) -> BTreeMap<&str, &Flow> {
        self.flows.iter().map(|f| (f.id.as_str(), f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_system(id: &str) -> System {
        System {
            id: SystemId::parse(id).unwrap(),
            name: None,
            owner_team: format!("team.{id}"),
            escalation: vec![],
            runbook_url: None,
            doc_root: None,
            flows: BTreeSet::new(),
        }
    }

    #[test]
    fn system_id_normalizes_case_and_whitespace() {
        let id = SystemId::parse("  Payments:Worker ").unwrap();
        assert_eq!(id.as_str(), "payments:worker");
        assert_eq!(id.root(), "payments");
        assert_eq!(id.child(), Some("worker"));
        assert_eq!(id.parent().unwrap().as_str(), "payments");
    }

    #[test]
    fn system_id_rejects_bad_components() {
        assert!(SystemId::parse("").is_err());
        assert!(SystemId::parse("9lives").is_err());
        assert!(SystemId::parse("payments:").is_err());
        assert!(SystemId::parse("a:b:c").is_err());
    }

    #[test]
    fn parent_and_child_are_distinct_keys() {
        let parent = SystemId::parse("payments").unwrap();
        let child = SystemId::parse("payments:worker").unwrap();
        assert_ne!(parent, child);
        assert!(parent.parent().is_none());
    }

    #[test]
    fn lookup_falls_back_to_parent() {
        let registry = SystemRegistry::new(vec![make_system("payments")], vec![]).unwrap();
        let child = SystemId::parse("payments:worker").unwrap();
        assert!(registry.get(&child).is_none());
        assert_eq!(registry.lookup(&child).unwrap().id.as_str(), "payments");
    }

    #[test]
    fn rejects_duplicate_system_ids() {
        let err = SystemRegistry::new(vec![make_system("ledger"), make_system("LEDGER")], vec![])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate system id"));
    }

    #[test]
    fn deserializes_registry_yaml() {
        let yaml = "systems:\n  - id: Checkout-Service\n    owner_team: team.checkout\n    flows: [checkout]\n    escalation:\n      - role: primary\n        name: Checkout Oncall\n        channel: pagerduty:checkout\nflows:\n  - id: checkout\n    level: 1\n";
        let registry: SystemRegistry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registry.systems[0].id.as_str(), "checkout-service");
        assert!(registry.systems[0].flows.contains("checkout"));
        assert_eq!(registry.flows[0].level, 1);
    }
}
