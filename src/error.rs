//! Operational errors: the "could not evaluate" category.
//!
//! Rule violations are never errors. They travel as `Diagnostic` and
//! `Finding` values so they can be fully enumerated.

use std::path::Path;

use thiserror::Error;

/// A system listing a flow that the catalog does not define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFlowRef {
    /// System that carries the reference.
    pub system_id: String,
    /// The undefined flow id.
    pub flow_id: String,
}

/// Failure that prevents an evaluation run from completing.
#[derive(Debug, Error)]
pub enum LineageError {
    /// A file could not be read.
    #[error("failed to read {path}: {message}")]
    Read {
        /// File that failed.
        path: String,
        /// Underlying error text.
        message: String,
    },

    /// A file could not be written.
    #[error("failed to write {path}: {message}")]
    Write {
        /// File that failed.
        path: String,
        /// Underlying error text.
        message: String,
    },

    /// A document was not valid JSON/YAML for its expected shape.
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Underlying error text.
        message: String,
    },

    /// A value failed to encode.
    #[error("failed to serialize {what}: {message}")]
    Serialize {
        /// What was being encoded.
        what: String,
        /// Underlying error text.
        message: String,
    },

    /// The system registry is structurally invalid.
    #[error("invalid system registry: {0}")]
    Registry(String),

    /// Systems reference flows absent from the flow catalog.
    #[error("unknown_flow_id: {}", format_unknown_flows(.0))]
    UnknownFlowIds(Vec<UnknownFlowRef>),

    /// A policy pack id could not be resolved by the pack source.
    #[error("policy pack {0:?} not found")]
    PolicyNotFound(String),

    /// Policy `extends` chain loops back on itself.
    #[error("policy extends cycle: {0}")]
    PolicyCycle(String),

    /// Policy pack declares a schema version this engine does not understand.
    #[error("policy {policy_id:?} has unsupported schema_version {found} (expected 1)")]
    PolicySchema {
        /// Offending pack.
        policy_id: String,
        /// Declared version.
        found: String,
    },

    /// Requested profile is not defined by the resolved policy.
    #[error("policy profile {0:?} is not defined")]
    UnknownProfile(String),

    /// A caller-supplied value is invalid.
    #[error("invalid {what} {value:?} (valid: {expected})")]
    InvalidValue {
        /// Name of the setting or argument.
        what: String,
        /// Value received.
        value: String,
        /// Accepted values.
        expected: String,
    },

    /// Escalation requested without a service id.
    #[error("service id cannot be empty")]
    EmptyService,
}

impl LineageError {
    pub(crate) fn invalid(what: &str, value: &str, expected: &str) -> Self {
        Self::InvalidValue {
            what: what.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    pub(crate) fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Read { path: path.display().to_string(), message: err.to_string() }
    }

    pub(crate) fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Write { path: path.display().to_string(), message: err.to_string() }
    }

    pub(crate) fn parse(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse { what: what.into(), message: err.to_string() }
    }

    pub(crate) fn serialize(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialize { what: what.into(), message: err.to_string() }
    }
}

fn format_unknown_flows(refs: &[UnknownFlowRef]) -> String {
    refs.iter()
        .map(|r| format!("{} -> {}", r.system_id, r.flow_id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flow_message_lists_every_reference() {
        let err = LineageError::UnknownFlowIds(vec![
            UnknownFlowRef { system_id: "payments".into(), flow_id: "checkout".into() },
            UnknownFlowRef { system_id: "ledger".into(), flow_id: "settle".into() },
        ]);
        assert_eq!(err.to_string(), "unknown_flow_id: payments -> checkout, ledger -> settle");
    }

    #[test]
    fn invalid_value_names_expected_values() {
        let err = LineageError::invalid("mode", "fail", "block|warn");
        assert!(err.to_string().contains("block|warn"));
    }
}
