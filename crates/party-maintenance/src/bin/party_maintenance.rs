//! Party store maintenance CLI.
//!
//! This binary delegates to `party_maintenance::cli` for parsing and
//! execution; it only wires up settings, logging, and the wall clock.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mockable::DefaultClock;
use party_maintenance::cli::{CliArgs, CliError, execute, resolve_store_path, summary};
use party_maintenance::{MaintenanceSettings, init_tracing};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "maintenance run failed");
            if let Err(write_err) = writeln!(io::stderr().lock(), "{err}") {
                drop(write_err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<bool, CliError> {
    let settings = MaintenanceSettings::load_settings()?;
    init_tracing(settings.json_logs);

    let store_path = resolve_store_path(args, &settings)?;
    let outcome = execute(args, &settings, Arc::new(DefaultClock))?;
    write_summary(&summary(&outcome, &store_path));
    Ok(outcome.is_success())
}

fn write_summary(message: &str) {
    if let Err(err) = writeln!(io::stdout().lock(), "{message}") {
        drop(err);
    }
}
