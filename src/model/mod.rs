//! Shared data model for normalization, diff, policy and escalation.
//!
//! Mirrors the artifact and registry schemas. Everything here is plain data
//! serialized with `serde`; behavior lives in the engine modules.

mod artifact;
mod field;
mod overrides;
mod severity;
mod system;

pub use artifact::{derive_edges, Edge, LineageArtifact, ARTIFACT_SCHEMA_VERSION};
pub use field::{
    BreakPolicy, Confidence, DataClassification, FieldLineage, MergeStrategy, Origin, Source,
    SourceKind, SourceScope, TransformType,
};
pub use overrides::{Override, ANY_CHANGE};
pub use severity::{ChangeType, EnforcementMode, GateAction, ImpactScope, Severity, Threshold};
pub use system::{Contact, Flow, System, SystemId, SystemRegistry};
