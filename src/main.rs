//! Binary entrypoint for the `lineage-gate` CLI.
//!
//! Exit codes: 0 pass, 1 gate blocked, 2 operational or usage error.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match lineage_gate::run(std::env::args()) {
        Ok(lineage_gate::Outcome::Pass) => ExitCode::SUCCESS,
        Ok(lineage_gate::Outcome::Blocked) => ExitCode::from(1),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}
