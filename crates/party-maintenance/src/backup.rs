//! Backup artifact naming and timestamp issuance.
//!
//! Backups live next to the primary store and are named
//! `<stem>.backup.<unix-millis>.json`, so `data.json` is backed up as
//! `data.backup.1718000000000.json`. [`BackupSequence`] never issues the
//! same millisecond twice within a process, which keeps names unique even
//! when backups are taken faster than the clock ticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use mockable::Clock;

const BACKUP_MARKER: &str = ".backup.";
const JSON_EXTENSION: &str = ".json";

/// Derives backup artifact names for one store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNaming {
    store_file: String,
    stem: String,
}

impl BackupNaming {
    /// Creates the naming scheme for the store file `store_file`.
    ///
    /// # Example
    ///
    /// ```
    /// use party_maintenance::BackupNaming;
    ///
    /// let naming = BackupNaming::for_store("data.json");
    /// assert_eq!(naming.name_for(1_718_000_000_000), "data.backup.1718000000000.json");
    /// ```
    #[must_use]
    pub fn for_store(store_file: &str) -> Self {
        let stem = store_file
            .strip_suffix(JSON_EXTENSION)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(store_file);
        Self {
            store_file: store_file.to_owned(),
            stem: stem.to_owned(),
        }
    }

    /// Returns the file name of the primary store.
    #[must_use]
    pub fn store_file(&self) -> &str {
        &self.store_file
    }

    /// Returns the backup file name for the given timestamp.
    #[must_use]
    pub fn name_for(&self, millis: i64) -> String {
        format!("{}{BACKUP_MARKER}{millis}{JSON_EXTENSION}", self.stem)
    }

    /// Extracts the timestamp from a backup file name produced by this
    /// scheme, or `None` if `name` is not one.
    #[must_use]
    pub fn parse_millis(&self, name: &str) -> Option<i64> {
        let digits = name
            .strip_prefix(self.stem.as_str())?
            .strip_prefix(BACKUP_MARKER)?
            .strip_suffix(JSON_EXTENSION)?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Issues strictly increasing millisecond timestamps for backup names.
pub struct BackupSequence {
    clock: Arc<dyn Clock>,
    last_issued: AtomicI64,
}

impl BackupSequence {
    /// Creates a sequence reading wall-clock time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_issued: AtomicI64::new(i64::MIN),
        }
    }

    /// Returns the current time in milliseconds, or one past the previously
    /// issued value when the clock has not advanced.
    pub fn next_millis(&self) -> i64 {
        let now = self.clock.utc().timestamp_millis();
        let mut previous = self.last_issued.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                previous,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(current) => previous = current,
            }
        }
    }
}

impl std::fmt::Debug for BackupSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupSequence")
            .field("last_issued", &self.last_issued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Confirmation that a backup artifact was written and read back intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReceipt {
    /// File name of the backup artifact.
    pub name: String,
    /// Timestamp embedded in the name.
    pub millis: i64,
    /// Number of membership records captured.
    pub membership_count: usize,
}
