//! Default table for optional annotation keys.

use std::collections::BTreeMap;

use super::field::{ESCALATION, OWNER};
use crate::model::{SystemId, SystemRegistry};

/// Keys every annotation must declare itself; defaults never fill them.
pub const BASE_REQUIRED_KEYS: &[&str] = &["field_id", "source_system"];

/// Keys the default table can fill.
pub const DEFAULTABLE_KEYS: &[&str] = &[
    "source_version",
    "min_supported_source_version",
    "transform",
    "merge_strategy",
    "break_policy",
    "data_classification",
    "confidence",
    "contract_test_id",
    "introduced_at",
    "flow",
    "note",
    "owner",
    "escalation",
];

/// Fixed defaults, optionally overlaid with policy `lineage.defaults`.
///
/// Pure data: resolving a value depends only on the table, the field being
/// normalized and the registry snapshot passed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultTable {
    overrides: BTreeMap<String, String>,
}

/// Field facts that templated defaults depend on.
pub struct DefaultContext<'a> {
    /// Resolved field id.
    pub field_id: &'a str,
    /// Resolved producing system.
    pub source_system: &'a SystemId,
    /// Declared or defaulted source version.
    pub source_version: Option<&'a str>,
    /// Number of parsed sources.
    pub source_count: usize,
    /// Registry snapshot.
    pub registry: &'a SystemRegistry,
}

impl DefaultTable {
    /// The built-in table.
    #[must_use]
    pub fn standard() -> Self {
        Self::default()
    }

    /// Overlays policy-provided defaults.
    ///
    /// Returns the table plus the keys that were refused: base-required
    /// identity keys and keys the table does not know.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> (Self, Vec<String>) {
        let mut accepted = BTreeMap::new();
        let mut refused = Vec::new();
        for (key, value) in overrides {
            if DEFAULTABLE_KEYS.contains(&key.as_str()) && !value.trim().is_empty() {
                accepted.insert(key.clone(), value.trim().to_string());
            } else {
                refused.push(key.clone());
            }
        }
        (Self { overrides: accepted }, refused)
    }

    /// Default for `key`, or `None` when the key has no default.
    ///
    /// `owner` and `escalation` prefer the registry entry for the field's
    /// system (with parent fallback) over any policy value. Registry values
    /// that do not fit the annotation format are skipped.
    #[must_use]
    pub fn value_for(&self, key: &str, ctx: &DefaultContext<'_>) -> Option<String> {
        let registered = ctx.registry.lookup(ctx.source_system);
        match key {
            "owner" => {
                if let Some(system) = registered.filter(|s| OWNER.is_match(s.owner_team.trim())) {
                    return Some(system.owner_team.trim().to_string());
                }
            }
            "escalation" => {
                if let Some(channel) = registered
                    .and_then(|s| s.escalation.iter().find(|c| ESCALATION.is_match(c.channel.trim())))
                    .map(|c| c.channel.trim().to_string())
                {
                    return Some(channel);
                }
            }
            _ => {}
        }
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        let root = ctx.source_system.root();
        let value = match key {
            "source_version" => "unversioned".to_string(),
            "min_supported_source_version" => {
                ctx.source_version.unwrap_or("unversioned").to_string()
            }
            "transform" => "passthrough".to_string(),
            "merge_strategy" => {
                if ctx.source_count > 1 { "priority" } else { "single_source" }.to_string()
            }
            "break_policy" => "strict".to_string(),
            "data_classification" => "internal".to_string(),
            "confidence" => "declared".to_string(),
            "contract_test_id" => format!("{}.contract", ctx.field_id),
            "introduced_at" => "1970-01-01".to_string(),
            "flow" => format!("from @{}", ctx.source_system),
            "note" => "undocumented".to_string(),
            "owner" => format!("team.{root}"),
            "escalation" => format!("slack:#{root}-oncall"),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contact, System};

    fn make_registry() -> SystemRegistry {
        SystemRegistry::new(
            vec![System {
                id: SystemId::parse("payments").unwrap(),
                name: None,
                owner_team: "team.payments".to_string(),
                escalation: vec![Contact {
                    role: "primary".to_string(),
                    name: "Payments Oncall".to_string(),
                    channel: "pagerduty:payments".to_string(),
                }],
                runbook_url: None,
                doc_root: None,
                flows: std::collections::BTreeSet::new(),
            }],
            vec![],
        )
        .unwrap()
    }

    fn ctx<'a>(system: &'a SystemId, registry: &'a SystemRegistry) -> DefaultContext<'a> {
        DefaultContext {
            field_id: "amount_minor",
            source_system: system,
            source_version: Some("v3"),
            source_count: 2,
            registry,
        }
    }

    #[test]
    fn registry_supplies_owner_and_escalation_with_parent_fallback() {
        let registry = make_registry();
        let system = SystemId::parse("payments:worker").unwrap();
        let table = DefaultTable::standard();
        assert_eq!(table.value_for("owner", &ctx(&system, &registry)).unwrap(), "team.payments");
        assert_eq!(
            table.value_for("escalation", &ctx(&system, &registry)).unwrap(),
            "pagerduty:payments"
        );
    }

    #[test]
    fn templated_defaults_without_registry_entry() {
        let registry = SystemRegistry::default();
        let system = SystemId::parse("ledger:settle").unwrap();
        let table = DefaultTable::standard();
        let c = ctx(&system, &registry);
        assert_eq!(table.value_for("owner", &c).unwrap(), "team.ledger");
        assert_eq!(table.value_for("escalation", &c).unwrap(), "slack:#ledger-oncall");
        assert_eq!(table.value_for("flow", &c).unwrap(), "from @ledger:settle");
        assert_eq!(table.value_for("merge_strategy", &c).unwrap(), "priority");
        assert_eq!(table.value_for("min_supported_source_version", &c).unwrap(), "v3");
        assert_eq!(table.value_for("contract_test_id", &c).unwrap(), "amount_minor.contract");
    }

    #[test]
    fn policy_overrides_refuse_identity_keys() {
        let overrides = BTreeMap::from([
            ("break_policy".to_string(), "additive_only".to_string()),
            ("source_system".to_string(), "anything".to_string()),
        ]);
        let (table, refused) = DefaultTable::with_overrides(&overrides);
        assert_eq!(refused, vec!["source_system".to_string()]);
        let registry = SystemRegistry::default();
        let system = SystemId::parse("ledger").unwrap();
        assert_eq!(table.value_for("break_policy", &ctx(&system, &registry)).unwrap(), "additive_only");
    }
}
