//! Store abstraction with explicit read and write boundaries.
//!
//! The reconciliation logic only talks to [`PartyStore`], so it can be
//! exercised against [`InMemoryStore`] fixtures without touching the
//! filesystem. [`JsonFileStore`] is the production adapter over the JSON
//! document the web app writes.

mod json_file;
mod lock;
mod memory;

pub use json_file::JsonFileStore;
pub use lock::StoreLock;
pub use memory::{InMemoryLockGuard, InMemoryStore};

use camino::Utf8Path;

use crate::backup::BackupReceipt;
use crate::error::StoreError;
use crate::model::StoreSnapshot;

/// Persistent party store.
///
/// Implementations must make [`PartyStore::backup`] durable and verified
/// before returning, and [`PartyStore::persist`] atomic: a failed persist
/// leaves the previous contents in place.
pub trait PartyStore {
    /// Guard returned by [`PartyStore::lock`]; exclusive access ends when it
    /// is dropped.
    type Guard;

    /// Human-readable location of the store for logs and messages.
    fn location(&self) -> String;

    /// Acquires exclusive access to the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another run holds the store.
    fn lock(&self) -> Result<Self::Guard, StoreError>;

    /// Reads and parses the full store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or parsed.
    fn load(&self) -> Result<StoreSnapshot, StoreError>;

    /// Writes an immutable, uniquely named copy of `snapshot` and confirms it
    /// reads back intact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backup`] if the copy cannot be written or
    /// confirmed. Callers must not mutate the store after this error.
    fn backup(&self, snapshot: &StoreSnapshot) -> Result<BackupReceipt, StoreError>;

    /// Replaces the whole store with `snapshot` in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the store cannot be rewritten.
    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError>;

    /// Loads a backup previously written by [`PartyStore::backup`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidBackupName`] for names outside the
    /// backup scheme, [`StoreError::BackupNotFound`] if it does not exist,
    /// or a read/parse error.
    fn read_backup(&self, name: &str) -> Result<StoreSnapshot, StoreError>;
}

/// Checks that a backup read back from storage holds what was written and
/// returns its membership count.
///
/// A snapshot loaded from text must read back byte for byte; any other
/// snapshot must read back with the same record counts.
pub(crate) fn confirm_backup(
    written: &StoreSnapshot,
    read_back: &str,
    path: &Utf8Path,
) -> Result<usize, StoreError> {
    let mismatch = |message: String| StoreError::Backup {
        path: path.to_path_buf(),
        message,
    };
    if written.source().is_some_and(|source| source != read_back) {
        return Err(mismatch("backup contents differ from the store".to_owned()));
    }
    let parsed = StoreSnapshot::from_json(read_back).map_err(|err| mismatch(err.to_string()))?;
    if parsed.counts() != written.counts() {
        return Err(mismatch(format!(
            "backup holds {:?} but snapshot holds {:?}",
            parsed.counts(),
            written.counts()
        )));
    }
    Ok(parsed.counts().memberships)
}
