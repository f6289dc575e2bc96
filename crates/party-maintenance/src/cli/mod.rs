//! Command-line surface of the maintenance tool.
//!
//! This module provides argument parsing, command execution, and summary
//! formatting. The binary delegates to these functions so they can be
//! exercised in tests without spawning a subprocess.

mod error;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use mockable::Clock;

pub use error::CliError;

use crate::audit::{AuditReport, audit_store};
use crate::config::MaintenanceSettings;
use crate::dedup::{KeyStrategyKind, MalformedPolicy};
use crate::reconcile::{
    ReconcileOptions, ReconcileReport, Reconciler, RestoreReport, restore_from_backup,
};
use crate::store::JsonFileStore;

/// `party-maintenance` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "party-maintenance",
    about = "Back up, reconcile, audit, and restore the party store",
    version
)]
pub struct CliArgs {
    /// Path to the store file; overrides `PARTY_MAINTENANCE_STORE_PATH`.
    #[arg(long = "store", value_name = "path", global = true)]
    pub store: Option<PathBuf>,
    /// Operation to run; defaults to `reconcile`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Maintenance operations.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Remove duplicate memberships after backing up the store.
    Reconcile(ReconcileArgs),
    /// Report integrity problems without changing the store.
    Audit(AuditArgs),
    /// Replace the store with one of its backups.
    Restore(RestoreArgs),
}

/// Flags for `reconcile`.
#[derive(Debug, Clone, Default, Args)]
pub struct ReconcileArgs {
    /// Report what would be removed without writing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Membership key strategy.
    #[arg(long, value_enum, value_name = "strategy")]
    pub key_strategy: Option<KeyStrategyKind>,
    /// Remove malformed memberships instead of keeping them in place.
    #[arg(long)]
    pub drop_malformed: bool,
    /// Skip reloading the store after rewriting it.
    #[arg(long)]
    pub no_verify: bool,
}

/// Flags for `audit`.
#[derive(Debug, Clone, Default, Args)]
pub struct AuditArgs {
    /// Membership key strategy used to detect duplicates.
    #[arg(long, value_enum, value_name = "strategy")]
    pub key_strategy: Option<KeyStrategyKind>,
}

/// Flags for `restore`.
#[derive(Debug, Clone, Args)]
pub struct RestoreArgs {
    /// File name of the backup, as printed by `reconcile`.
    #[arg(long, value_name = "file-name")]
    pub backup: String,
}

/// Result of a CLI invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A reconciliation (or dry run) finished.
    Reconciled(ReconcileReport),
    /// An audit finished.
    Audited(AuditReport),
    /// A restore finished.
    Restored(RestoreReport),
}

impl Outcome {
    /// Returns `false` when an audit found problems, so the process can exit
    /// non-zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Audited(report) => report.is_clean(),
            Self::Reconciled(_) | Self::Restored(_) => true,
        }
    }
}

/// Parses arguments, including the program name, into [`CliArgs`].
///
/// # Errors
///
/// Returns [`CliError::Arguments`] for unknown flags or invalid values.
/// Help and version requests also surface as this error, carrying the
/// rendered text.
///
/// # Example
///
/// ```
/// use party_maintenance::cli::{Command, parse_args};
///
/// let args = parse_args(["party-maintenance", "audit", "--store", "data.json"]).expect("parse");
/// assert!(matches!(args.command, Some(Command::Audit(_))));
/// ```
pub fn parse_args<I, T>(args: I) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CliArgs::try_parse_from(args).map_err(|err| CliError::Arguments {
        message: err.to_string(),
    })
}

/// Resolves the store path from flags and settings.
///
/// # Errors
///
/// Returns [`CliError::NonUtf8StorePath`] if the path is not valid UTF-8.
pub fn resolve_store_path(
    args: &CliArgs,
    settings: &MaintenanceSettings,
) -> Result<Utf8PathBuf, CliError> {
    let path = args.store.clone().unwrap_or_else(|| settings.store_path());
    Utf8PathBuf::from_path_buf(path).map_err(|path| CliError::NonUtf8StorePath {
        path: path.to_string_lossy().into_owned(),
    })
}

/// Runs the requested operation against the store.
///
/// # Errors
///
/// Returns [`CliError`] if settings are invalid, the store cannot be opened
/// or read, or a reconcile/restore run aborts.
pub fn execute(
    args: &CliArgs,
    settings: &MaintenanceSettings,
    clock: Arc<dyn Clock>,
) -> Result<Outcome, CliError> {
    let path = resolve_store_path(args, settings)?;
    let store = JsonFileStore::open(&path, clock)?;

    let default_command = Command::Reconcile(ReconcileArgs::default());
    match args.command.as_ref().unwrap_or(&default_command) {
        Command::Reconcile(flags) => {
            let kind = flags
                .key_strategy
                .map_or_else(|| settings.key_strategy(), Ok)?;
            let options = ReconcileOptions {
                dry_run: flags.dry_run,
                verify: settings.verify && !flags.no_verify,
                malformed: if flags.drop_malformed {
                    MalformedPolicy::Drop
                } else {
                    settings.malformed_policy()
                },
            };
            let reconciler = Reconciler::new(Arc::new(store), kind.strategy(), options);
            Ok(Outcome::Reconciled(reconciler.run()?))
        }
        Command::Audit(flags) => {
            let kind = flags
                .key_strategy
                .map_or_else(|| settings.key_strategy(), Ok)?;
            let strategy = kind.strategy();
            Ok(Outcome::Audited(audit_store(&store, strategy.as_ref())?))
        }
        Command::Restore(flags) => Ok(Outcome::Restored(restore_from_backup(
            &store,
            &flags.backup,
        )?)),
    }
}

/// Formats the summary printed on stdout after a run.
#[must_use]
pub fn summary(outcome: &Outcome, store_path: &Utf8Path) -> String {
    match outcome {
        Outcome::Reconciled(report) => reconcile_summary(report, store_path),
        Outcome::Audited(report) => audit_summary(report, store_path),
        Outcome::Restored(report) => format!(
            "Restored {store_path} from {} ({} memberships); previous contents saved to {}",
            report.restored_from, report.counts.memberships, report.safety_backup.name
        ),
    }
}

fn reconcile_summary(report: &ReconcileReport, store_path: &Utf8Path) -> String {
    let dropped = report.dedup.dropped_count();
    let malformed = report.dedup.malformed().len();
    let kept = report.after.memberships;
    match &report.backup {
        Some(backup) => format!(
            "Reconciled {store_path} ({}): removed {dropped} duplicate memberships, kept {kept}, \
             {malformed} malformed; backup {}",
            report.strategy, backup.name
        ),
        None => format!(
            "Dry run on {store_path} ({}): would remove {dropped} duplicate memberships, \
             keep {kept}, {malformed} malformed; nothing written",
            report.strategy
        ),
    }
}

fn audit_summary(report: &AuditReport, store_path: &Utf8Path) -> String {
    let mut lines = vec![format!(
        "Audit of {store_path} ({}): {} memberships",
        report.strategy, report.membership_count
    )];
    if report.is_clean() {
        lines.push("no problems found".to_owned());
        return lines.join("\n");
    }
    for duplicate in &report.duplicate_memberships {
        lines.push(format!(
            "duplicate membership at index {} repeats index {} {}",
            duplicate.index, duplicate.kept_index, duplicate.key
        ));
    }
    for malformed in report
        .malformed_memberships
        .iter()
        .chain(&report.malformed_users)
        .chain(&report.malformed_parties)
    {
        lines.push(malformed.to_string());
    }
    for orphan in &report.orphaned_memberships {
        lines.push(format!(
            "orphaned membership at index {} ({:?}, {:?}): missing {:?}",
            orphan.index, orphan.user_id, orphan.party_id, orphan.missing
        ));
    }
    for shared in &report.duplicate_party_codes {
        lines.push(format!(
            "party code {:?} shared by parties at {:?}",
            shared.value, shared.indices
        ));
    }
    for shared in &report.duplicate_user_emails {
        lines.push(format!(
            "email {:?} shared by users at {:?}",
            shared.value, shared.indices
        ));
    }
    lines.join("\n")
}
