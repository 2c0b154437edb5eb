//! Policy evaluator.
//!
//! Resolves a pack and its `extends` chain, applies a profile, then turns
//! drift items into findings and a gate decision. Packs can only add
//! strictness: base requirements survive any merge.

mod evaluate;
mod guidance;
mod pack;
mod requirements;
mod resolve;

pub use evaluate::{
    evaluate, ChangeEvent, Evaluation, Finding, FlowContext, GateDecision, GateSettings, Summary,
};
pub use guidance::{impact, remediation};
pub use pack::{
    FindingsPolicy, FlowCriticality, LevelDirection, LineagePolicy, PolicyPack, Requirements,
    SelfOnlyPolicy, DEFAULT_CRITICAL_FLOW_REASON,
};
pub use requirements::{check as check_requirements, RuleViolation};
pub use resolve::{
    parse_document, resolve, CompatibilityNote, DirectoryPackSource, PackLibrary, PackSource,
    ResolvedPolicy, BUILTIN_POLICY_ID, POLICY_SCHEMA_VERSION,
};
