//! Membership reconciliation and restore orchestration.
//!
//! A reconciliation run moves through
//! `Start → BackedUp → Deduped → Persisted → Done`. The store is locked for
//! the whole run, the backup is confirmed before the dedup result is
//! computed, and nothing is written until that backup exists. A dry run
//! goes `Start → Deduped → Done` and writes nothing.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backup::BackupReceipt;
use crate::dedup::{DedupOutcome, KeyStrategy, MalformedPolicy, dedup_memberships};
use crate::error::ReconcileError;
use crate::model::RecordCounts;
use crate::store::PartyStore;

/// Stage reached by a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// Store locked and loaded; nothing written.
    Start,
    /// Backup written and confirmed.
    BackedUp,
    /// Duplicates identified.
    Deduped,
    /// Rewritten store persisted.
    Persisted,
    /// Run finished.
    Done,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::BackedUp => "backed_up",
            Self::Deduped => "deduped",
            Self::Persisted => "persisted",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Knobs for a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Report what would change without backing up or writing.
    pub dry_run: bool,
    /// Reload the store after persisting and check record counts.
    pub verify: bool,
    /// Handling of records that cannot be keyed.
    pub malformed: MalformedPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verify: true,
            malformed: MalformedPolicy::Keep,
        }
    }
}

/// Summary of a finished reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Phases entered, in order.
    pub phases: Vec<ReconcilePhase>,
    /// Name of the key strategy used.
    pub strategy: &'static str,
    /// Backup taken before the rewrite; `None` for dry runs.
    pub backup: Option<BackupReceipt>,
    /// Record counts before the run.
    pub before: RecordCounts,
    /// Record counts after the run (or that a real run would produce).
    pub after: RecordCounts,
    /// Deduplication details.
    pub dedup: DedupOutcome,
    /// Whether the run was a dry run.
    pub dry_run: bool,
}

impl ReconcileReport {
    /// Returns the final phase reached.
    #[must_use]
    pub fn final_phase(&self) -> ReconcilePhase {
        self.phases.last().copied().unwrap_or(ReconcilePhase::Start)
    }
}

/// Summary of a finished restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Backup the store was restored from.
    pub restored_from: String,
    /// Backup of the store contents replaced by the restore.
    pub safety_backup: BackupReceipt,
    /// Record counts now in the store.
    pub counts: RecordCounts,
}

struct PhaseLog {
    phases: Vec<ReconcilePhase>,
}

impl PhaseLog {
    fn start() -> Self {
        debug!(phase = %ReconcilePhase::Start, "reconcile phase");
        Self {
            phases: vec![ReconcilePhase::Start],
        }
    }

    fn enter(&mut self, phase: ReconcilePhase) {
        debug!(phase = %phase, "reconcile phase");
        self.phases.push(phase);
    }
}

/// Drives membership reconciliation against a [`PartyStore`].
pub struct Reconciler<S> {
    store: Arc<S>,
    strategy: Box<dyn KeyStrategy>,
    options: ReconcileOptions,
}

impl<S> Reconciler<S> {
    /// Creates a reconciler for `store` using `strategy` to key memberships.
    #[must_use]
    pub fn new(store: Arc<S>, strategy: Box<dyn KeyStrategy>, options: ReconcileOptions) -> Self {
        Self {
            store,
            strategy,
            options,
        }
    }

    /// Returns the options this reconciler runs with.
    #[must_use]
    pub const fn options(&self) -> ReconcileOptions {
        self.options
    }
}

impl<S> Reconciler<S>
where
    S: PartyStore,
{
    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] if the store cannot be locked,
    /// loaded, backed up, or rewritten; the primary store is untouched for
    /// every failure before the rewrite. Returns
    /// [`ReconcileError::Verification`] if the rewritten store does not read
    /// back with the expected record counts.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use party_maintenance::{
    ///     InMemoryStore, ReconcileOptions, ReconcilePhase, Reconciler, UserPartyKey,
    /// };
    ///
    /// let store = Arc::new(InMemoryStore::from_json(
    ///     r#"{"memberships": [
    ///         {"userId": "u1", "partyId": "p1"},
    ///         {"userId": "u2", "partyId": "p1"},
    ///         {"userId": "u1", "partyId": "p1"}
    ///     ]}"#,
    /// ));
    /// let reconciler = Reconciler::new(store, Box::new(UserPartyKey), ReconcileOptions::default());
    ///
    /// let report = reconciler.run().expect("reconcile");
    /// assert_eq!(report.dedup.dropped_count(), 1);
    /// assert_eq!(report.final_phase(), ReconcilePhase::Done);
    /// ```
    pub fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let _guard = self.store.lock()?;
        let mut log = PhaseLog::start();
        let snapshot = self.store.load()?;
        let before = snapshot.counts();
        info!(
            store = %self.store.location(),
            strategy = self.strategy.name(),
            memberships = before.memberships,
            dry_run = self.options.dry_run,
            "reconciliation started"
        );

        let backup = if self.options.dry_run {
            None
        } else {
            let receipt = self.store.backup(&snapshot)?;
            log.enter(ReconcilePhase::BackedUp);
            Some(receipt)
        };

        let dedup = dedup_memberships(
            snapshot.memberships(),
            self.strategy.as_ref(),
            self.options.malformed,
        );
        log.enter(ReconcilePhase::Deduped);
        report_dedup(&dedup);

        let rewritten = snapshot.with_memberships(dedup.retained().to_vec());
        let after = rewritten.counts();

        if let Some(receipt) = &backup {
            self.store.persist(&rewritten)?;
            log.enter(ReconcilePhase::Persisted);
            if self.options.verify {
                verify_counts(&*self.store, after, &receipt.name)?;
            }
        }
        log.enter(ReconcilePhase::Done);

        info!(
            dropped = dedup.dropped_count(),
            malformed = dedup.malformed().len(),
            retained = after.memberships,
            backup = backup.as_ref().map(|receipt| receipt.name.as_str()),
            "reconciliation finished"
        );

        Ok(ReconcileReport {
            phases: log.phases,
            strategy: self.strategy.name(),
            backup,
            before,
            after,
            dedup,
            dry_run: self.options.dry_run,
        })
    }
}

fn report_dedup(dedup: &DedupOutcome) {
    for record in dedup.malformed() {
        warn!(index = record.index, reason = %record.reason, "skipping malformed membership");
    }
    for dropped in dedup.dropped() {
        debug!(
            index = dropped.index,
            kept_index = dropped.kept_index,
            key = %dropped.key,
            "dropping duplicate membership"
        );
    }
}

fn verify_counts<S: PartyStore>(
    store: &S,
    expected: RecordCounts,
    backup: &str,
) -> Result<(), ReconcileError> {
    let reloaded = store.load()?.counts();
    let checks = [
        ("users", expected.users, reloaded.users),
        ("parties", expected.parties, reloaded.parties),
        ("memberships", expected.memberships, reloaded.memberships),
    ];
    for (collection, expected_count, actual) in checks {
        if actual != expected_count {
            return Err(ReconcileError::Verification {
                collection,
                expected: expected_count,
                actual,
                backup: backup.to_owned(),
            });
        }
    }
    debug!("rewritten store verified");
    Ok(())
}

/// Replaces the store contents with the backup named `backup_name`.
///
/// The current contents are backed up first, so a restore can itself be
/// undone.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] if the backup name is invalid or
/// missing, or if the store cannot be locked, backed up, or rewritten, and
/// [`ReconcileError::Verification`] if the restored store reads back with
/// different record counts.
pub fn restore_from_backup<S: PartyStore>(
    store: &S,
    backup_name: &str,
) -> Result<RestoreReport, ReconcileError> {
    let _guard = store.lock()?;
    let restored = store.read_backup(backup_name)?;
    let current = store.load()?;

    let safety_backup = store.backup(&current)?;
    store.persist(&restored)?;
    let counts = restored.counts();
    verify_counts(store, counts, &safety_backup.name)?;

    info!(
        store = %store.location(),
        restored_from = backup_name,
        safety_backup = %safety_backup.name,
        "store restored from backup"
    );

    Ok(RestoreReport {
        restored_from: backup_name.to_owned(),
        safety_backup,
        counts,
    })
}
