//! Core library entry for the `lineage-gate` CLI.
//!
//! Normalizes field-lineage annotations into artifacts, diffs artifacts into
//! drift items, gates the drift through policy packs and resolves upstream
//! escalation chains.

pub mod adapters;
pub mod artifact;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod escalation;
pub mod model;
pub mod normalize;
pub mod policy;
pub mod ports;
pub mod report;
pub mod store;

use clap::Parser;

pub use commands::Outcome;
pub use error::LineageError;

/// Run the CLI with the provided arguments.
///
/// `--help` and `--version` print to stdout and count as a pass.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<Outcome, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match cli::Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            print!("{err}");
            return Ok(Outcome::Pass);
        }
        Err(err) => return Err(err.to_string()),
    };
    commands::dispatch(&cli.command)
}

#[cfg(test)]
mod tests {
    use super::{run, Outcome};

    #[test]
    fn run_prints_help_as_pass() {
        assert_eq!(run(["lineage-gate", "--help"]), Ok(Outcome::Pass));
    }

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let result = run(["lineage-gate", "unknown"]);
        assert!(result.is_err());
    }
}
