//! `lineage-gate diff` command.

use crate::cli::DiffArgs;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::drift;
use crate::error::LineageError;
use crate::model::{EnforcementMode, Threshold};
use crate::policy::{self, GateSettings};
use crate::report;
use crate::store::LineageStore;

use super::{emit, load_policy, Outcome};

/// Execute the `diff` command.
///
/// Every finding is reported whatever the gate decides. Returns
/// [`Outcome::Blocked`] only in block mode.
///
/// # Errors
///
/// Returns an error if an artifact or the policy cannot be loaded, a flag
/// is invalid, or the report cannot be written.
pub fn run(ctx: &ServiceContext, settings: &Settings, args: &DiffArgs) -> Result<Outcome, LineageError> {
    let gate = GateSettings {
        threshold: args
            .fail_on
            .as_deref()
            .map(str::parse::<Threshold>)
            .transpose()?
            .unwrap_or(settings.fail_on),
        mode: args
            .mode
            .as_deref()
            .map(str::parse::<EnforcementMode>)
            .transpose()?
            .unwrap_or(settings.mode),
    };
    let policy = load_policy(ctx, settings, &args.policy)?;

    let store = LineageStore::new(ctx);
    let baseline = store.load_artifact(&args.base)?;
    let head = store.load_artifact(&args.head)?;

    let today = ctx.clock.today();
    let items = drift::diff(&baseline, &head, today);
    let evaluation = policy::evaluate(&items, &head, &policy, gate, today);
    emit(&store, args.out.as_deref(), &report::render(&evaluation, args.format)?)?;

    if evaluation.gate.blocks() {
        Ok(Outcome::Blocked)
    } else {
        Ok(Outcome::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixed::FixedClock;
    use crate::adapters::memory::MemoryFileSystem;
    use crate::artifact::ExportProfile;
    use crate::cli::{ExportArgs, PolicyArgs};
    use crate::commands::export;
    use crate::report::Format;
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};

    const SYSTEMS: &str = "systems:\n  - id: identity\n    owner_team: team.identity\n  - id: gateway\n    owner_team: team.gateway\n";

    const CONSUMER: &str = "  - field_id: checkout_user_ref
    values:
      source_system: gateway
      sources: api:identity.get_user#user_id?contract_ref=identity-v1&upstream_system=identity
";

    const PRODUCER: &str = "  - field_id: response_user_id
    values:
      field: response.user_id
      source_system: identity
";

    fn make_context() -> ServiceContext {
        let fs = MemoryFileSystem::new()
            .with_file("/repo/systems.yaml", SYSTEMS)
            .with_file("/repo/base.yaml", format!("fields:\n{PRODUCER}{CONSUMER}"))
            .with_file("/repo/head.yaml", format!("fields:\n{CONSUMER}"));
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let ctx = ServiceContext::new(Box::new(FixedClock::on(today)), Box::new(fs));
        for name in ["base", "head"] {
            let args = ExportArgs {
                annotations: vec![PathBuf::from(format!("/repo/{name}.yaml"))],
                sidecars: vec![],
                systems: Some(PathBuf::from("/repo/systems.yaml")),
                flows: None,
                policy: PolicyArgs::default(),
                allow_unknown_flows: false,
                export_profile: ExportProfile::Canonical,
                out: Some(PathBuf::from(format!("/repo/{name}.json"))),
            };
            export::run(&ctx, &Settings::default(), &args).unwrap();
        }
        ctx
    }

    fn make_args(fail_on: &str, mode: &str) -> DiffArgs {
        DiffArgs {
            base: PathBuf::from("/repo/base.json"),
            head: PathBuf::from("/repo/head.json"),
            policy: PolicyArgs::default(),
            fail_on: Some(fail_on.to_string()),
            mode: Some(mode.to_string()),
            format: Format::Json,
            out: Some(PathBuf::from("/repo/report.json")),
        }
    }

    #[test]
    fn removal_blocks_and_warn_mode_passes() {
        let ctx = make_context();
        let settings = Settings::default();
        assert_eq!(run(&ctx, &settings, &make_args("medium", "block")).unwrap(), Outcome::Blocked);

        let report = LineageStore::new(&ctx).read(Path::new("/repo/report.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["findings"][0]["change_type"], "field_removed");
        assert_eq!(value["gate"]["action"], "block");

        assert_eq!(run(&ctx, &settings, &make_args("medium", "warn")).unwrap(), Outcome::Pass);
    }

    #[test]
    fn rejects_unknown_threshold() {
        let ctx = make_context();
        let err = run(&ctx, &Settings::default(), &make_args("severe", "block")).unwrap_err();
        assert!(matches!(err, LineageError::InvalidValue { .. }));
    }
}
