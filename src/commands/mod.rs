//! Command dispatch and handlers.

pub mod diff;
pub mod escalate;
pub mod export;

use crate::cli::{Command, PolicyArgs};
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::LineageError;
use crate::policy::{self, DirectoryPackSource, ResolvedPolicy};

/// How a successful command run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing gates the release.
    Pass,
    /// The gate blocked in block mode.
    Blocked,
}

/// Dispatch a parsed command to its handler.
///
/// Settings come from the environment (after `.env`); the clock is pinned
/// when `LINEAGE_TODAY` is set.
///
/// # Errors
///
/// Returns an error string if settings are invalid or the command fails.
pub fn dispatch(command: &Command) -> Result<Outcome, String> {
    let settings = Settings::from_env().map_err(|e| e.to_string())?;
    let ctx = ServiceContext::from_settings(&settings);
    dispatch_with_context(command, &ctx, &settings)
}

/// Dispatch a command with the given service context and settings.
///
/// # Errors
///
/// Returns an error string if the selected command handler fails.
pub fn dispatch_with_context(
    command: &Command,
    ctx: &ServiceContext,
    settings: &Settings,
) -> Result<Outcome, String> {
    let result = match command {
        Command::Export(args) => export::run(ctx, settings, args),
        Command::Diff(args) => diff::run(ctx, settings, args),
        Command::Escalate(args) => escalate::run(ctx, settings, args),
    };
    result.map_err(|err| err.to_string())
}

/// Resolves the selected policy pack, or the built-in policy.
fn load_policy(
    ctx: &ServiceContext,
    settings: &Settings,
    args: &PolicyArgs,
) -> Result<ResolvedPolicy, LineageError> {
    match &args.policy {
        Some(policy_id) => {
            let source = DirectoryPackSource::new(ctx.fs.as_ref(), &settings.policy_dir);
            policy::resolve(&source, policy_id, args.profile.as_deref())
        }
        None => match &args.profile {
            Some(profile) => Err(LineageError::UnknownProfile(profile.clone())),
            None => Ok(ResolvedPolicy::builtin()),
        },
    }
}

/// Writes `contents` to `out`, or stdout when no path was given.
fn emit(
    store: &crate::store::LineageStore<'_>,
    out: Option<&std::path::Path>,
    contents: &str,
) -> Result<(), LineageError> {
    match out {
        Some(path) => {
            store.write(path, contents)?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => print!("{contents}"),
    }
    Ok(())
}
