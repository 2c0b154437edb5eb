//! `lineage-gate export` command.

use crate::artifact::{self, BuildOptions};
use crate::cli::ExportArgs;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::LineageError;
use crate::normalize::{self, NormalizeContext, SidecarSet};
use crate::store::LineageStore;

use super::{emit, load_policy, Outcome};

/// Execute the `export` command.
///
/// Per-field diagnostics are printed to stderr and never fail the run;
/// unreadable inputs and unknown flow ids do.
///
/// # Errors
///
/// Returns an error if an input cannot be loaded or the artifact cannot be
/// built or written.
pub fn run(ctx: &ServiceContext, settings: &Settings, args: &ExportArgs) -> Result<Outcome, LineageError> {
    let store = LineageStore::new(ctx);
    let policy = load_policy(ctx, settings, &args.policy)?;
    for note in &policy.notes {
        eprintln!("note: {note}");
    }

    let registry = store.load_registry(args.systems.as_deref(), args.flows.as_deref())?;
    let mut records = Vec::new();
    let mut override_records = Vec::new();
    for path in &args.annotations {
        let document = store.load_annotations(path)?;
        records.extend(document.fields);
        override_records.extend(document.overrides);
    }
    let sidecars = args
        .sidecars
        .iter()
        .map(|path| store.load_sidecar(path))
        .collect::<Result<Vec<_>, _>>()?;
    let sidecars = SidecarSet::new(sidecars);

    let normalized = normalize::normalize(
        &records,
        &override_records,
        &NormalizeContext { registry: &registry, sidecars: &sidecars, defaults: &policy.defaults },
    );
    for diagnostic in &normalized.diagnostics {
        eprintln!("{diagnostic}");
    }

    let options = BuildOptions { tolerate_unknown_flows: args.allow_unknown_flows };
    let built = artifact::build(&normalized, &registry, options)?;
    emit(&store, args.out.as_deref(), &artifact::to_json_for(&built, args.export_profile)?)?;

    if !normalized.diagnostics.is_empty() {
        eprintln!(
            "{} field(s) exported, {} diagnostic(s).",
            built.fields.len(),
            normalized.diagnostics.len()
        );
    }
    Ok(Outcome::Pass)
}
