//! `lineage-gate escalate` command.

use crate::cli::EscalateArgs;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::LineageError;
use crate::escalation;
use crate::report;
use crate::store::LineageStore;

use super::Outcome;

/// Execute the `escalate` command.
///
/// One service prints its chain as a JSON array of steps; several print an
/// array of `{service, steps}` objects in the order given.
///
/// # Errors
///
/// Returns an error if the artifact or registry cannot be loaded or a
/// service id is empty or malformed.
pub fn run(ctx: &ServiceContext, settings: &Settings, args: &EscalateArgs) -> Result<Outcome, LineageError> {
    let store = LineageStore::new(ctx);
    let artifact = store.load_artifact(&args.artifact)?;
    let registry = match &args.systems {
        Some(path) => store.load_registry(Some(path), None)?,
        None => artifact.registry(),
    };
    let max_depth = args.max_depth.unwrap_or(settings.max_depth);

    let chains = escalation::escalate_all(&args.services, &artifact, &registry, max_depth)?;
    let json = match chains.as_slice() {
        [single] => report::to_json(&single.steps, "escalation chain")?,
        _ => report::to_json(&chains, "escalation chains")?,
    };
    print!("{json}");
    Ok(Outcome::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixed::FixedClock;
    use crate::adapters::memory::MemoryFileSystem;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn make_test_context(fs: MemoryFileSystem) -> ServiceContext {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        ServiceContext::new(Box::new(FixedClock::on(today)), Box::new(fs))
    }

    #[test]
    fn blank_service_is_an_operational_error() {
        let fs = MemoryFileSystem::new().with_file("/a.json", r#"{"fields":[]}"#);
        let ctx = make_test_context(fs);
        let args = EscalateArgs {
            services: vec![String::new()],
            artifact: PathBuf::from("/a.json"),
            systems: None,
            max_depth: None,
        };
        let err = run(&ctx, &Settings::default(), &args).unwrap_err();
        assert!(matches!(err, LineageError::EmptyService));
    }
}
