//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::artifact::ExportProfile;
use crate::report::Format;

/// Top-level CLI parser for `lineage-gate`.
#[derive(Debug, Parser)]
#[command(
    name = "lineage-gate",
    version,
    about = "Export field lineage, gate drift against policy and resolve escalation paths"
)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Normalize annotations into a lineage artifact.
    Export(ExportArgs),
    /// Diff two artifacts and evaluate the drift against policy.
    Diff(DiffArgs),
    /// Resolve who to escalate to upstream of a service.
    Escalate(EscalateArgs),
}

/// Policy selection shared by `export` and `diff`.
#[derive(Debug, Clone, Default, Args)]
pub struct PolicyArgs {
    /// Policy pack id, loaded from `LINEAGE_POLICY_DIR`.
    #[arg(long)]
    pub policy: Option<String>,
    /// Profile overlay defined by the policy.
    #[arg(long, requires = "policy")]
    pub profile: Option<String>,
}

/// Arguments for `export`.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Annotation files produced by language adapters.
    #[arg(long = "annotations", required = true, num_args = 1..)]
    pub annotations: Vec<PathBuf>,
    /// Sidecar files with directory defaults.
    #[arg(long = "sidecar", num_args = 1..)]
    pub sidecars: Vec<PathBuf>,
    /// System registry.
    #[arg(long)]
    pub systems: Option<PathBuf>,
    /// Flow catalog, when not embedded in the registry.
    #[arg(long)]
    pub flows: Option<PathBuf>,
    /// Policy selection.
    #[command(flatten)]
    pub policy: PolicyArgs,
    /// Keep going when systems reference undefined flows.
    #[arg(long)]
    pub allow_unknown_flows: bool,
    /// Alias keys to add for other lineage tools.
    #[arg(long = "export-profile", value_enum, default_value_t = ExportProfile::Canonical)]
    pub export_profile: ExportProfile,
    /// Write the artifact here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `diff`.
#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Baseline artifact.
    #[arg(long)]
    pub base: PathBuf,
    /// Head artifact.
    #[arg(long)]
    pub head: PathBuf,
    /// Policy selection.
    #[command(flatten)]
    pub policy: PolicyArgs,
    /// Gate threshold: high, medium, low, info or none.
    #[arg(long)]
    pub fail_on: Option<String>,
    /// Enforcement mode: block or warn.
    #[arg(long)]
    pub mode: Option<String>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,
    /// Write the report here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `escalate`.
#[derive(Debug, Args)]
pub struct EscalateArgs {
    /// Services to resolve.
    #[arg(long = "service", required = true, num_args = 1..)]
    pub services: Vec<String>,
    /// Artifact holding the lineage graph.
    #[arg(long)]
    pub artifact: PathBuf,
    /// System registry; defaults to the systems embedded in the artifact.
    #[arg(long)]
    pub systems: Option<PathBuf>,
    /// Maximum hops upstream.
    #[arg(long)]
    pub max_depth: Option<usize>,
}
