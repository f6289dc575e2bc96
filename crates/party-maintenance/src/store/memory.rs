//! In-memory party store for tests and fixtures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;

use super::{PartyStore, confirm_backup};
use crate::backup::{BackupNaming, BackupReceipt};
use crate::error::StoreError;
use crate::model::StoreSnapshot;

const STORE_FILE: &str = "memory.json";

#[derive(Debug, Default)]
struct State {
    primary: Option<String>,
    backups: Vec<(String, String)>,
    next_millis: i64,
    locked: bool,
    persist_count: usize,
    fail_backup: bool,
    fail_persist: bool,
    corrupt_on_persist: Option<StoreSnapshot>,
}

/// Party store held in memory as serialised JSON.
///
/// Backups are numbered from zero. Failure switches let tests exercise the
/// abort paths of the reconciliation flow.
///
/// # Example
///
/// ```
/// use party_maintenance::{InMemoryStore, PartyStore};
///
/// let store = InMemoryStore::from_json(r#"{"memberships": []}"#);
/// let snapshot = store.load().expect("load");
/// let receipt = store.backup(&snapshot).expect("backup");
///
/// assert_eq!(receipt.name, "memory.backup.0.json");
/// assert_eq!(store.backup_names(), vec![receipt.name]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates a store whose primary document is `json`, which need not be
    /// valid.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        let store = Self::default();
        store.lock_state().primary = Some(json.to_owned());
        store
    }

    /// Makes every subsequent backup fail.
    pub fn fail_backups(&self) {
        self.lock_state().fail_backup = true;
    }

    /// Makes every subsequent persist fail without touching the document.
    pub fn fail_persists(&self) {
        self.lock_state().fail_persist = true;
    }

    /// Makes the next persist store `snapshot` instead of what it was given,
    /// simulating a rewrite that lost records.
    pub fn corrupt_next_persist(&self, snapshot: StoreSnapshot) {
        self.lock_state().corrupt_on_persist = Some(snapshot);
    }

    /// Returns the current primary document.
    #[must_use]
    pub fn primary_json(&self) -> Option<String> {
        self.lock_state().primary.clone()
    }

    /// Returns the names of all backups in creation order.
    #[must_use]
    pub fn backup_names(&self) -> Vec<String> {
        self.lock_state()
            .backups
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns how many persists succeeded.
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.lock_state().persist_count
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn naming() -> BackupNaming {
        BackupNaming::for_store(STORE_FILE)
    }

    fn memory_path(name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from("memory").join(name)
    }
}

/// Exclusive access to an [`InMemoryStore`], released on drop.
#[derive(Debug)]
pub struct InMemoryLockGuard {
    state: Arc<Mutex<State>>,
}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locked = false;
    }
}

impl PartyStore for InMemoryStore {
    type Guard = InMemoryLockGuard;

    fn location(&self) -> String {
        Self::memory_path(STORE_FILE).into_string()
    }

    fn lock(&self) -> Result<InMemoryLockGuard, StoreError> {
        let mut state = self.lock_state();
        if state.locked {
            return Err(StoreError::Locked {
                path: Self::memory_path(STORE_FILE),
                lock_path: Self::memory_path(".memory.json.lock"),
            });
        }
        state.locked = true;
        Ok(InMemoryLockGuard {
            state: Arc::clone(&self.state),
        })
    }

    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.lock_state();
        let json = state.primary.as_deref().ok_or_else(|| StoreError::Io {
            path: Self::memory_path(STORE_FILE),
            message: "store is empty".to_owned(),
        })?;
        StoreSnapshot::from_json(json)
    }

    fn backup(&self, snapshot: &StoreSnapshot) -> Result<BackupReceipt, StoreError> {
        let mut state = self.lock_state();
        let millis = state.next_millis;
        let name = Self::naming().name_for(millis);
        if state.fail_backup {
            return Err(StoreError::Backup {
                path: Self::memory_path(&name),
                message: "backup failure injected".to_owned(),
            });
        }

        let contents = snapshot.to_store_json()?;
        let membership_count = confirm_backup(snapshot, &contents, &Self::memory_path(&name))?;
        state.next_millis = millis.saturating_add(1);
        state.backups.push((name.clone(), contents));

        Ok(BackupReceipt {
            name,
            millis,
            membership_count,
        })
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let mut state = self.lock_state();
        if state.fail_persist {
            return Err(StoreError::Write {
                path: Self::memory_path(STORE_FILE),
                message: "persist failure injected".to_owned(),
            });
        }
        let written = state.corrupt_on_persist.take();
        let contents = written.as_ref().unwrap_or(snapshot).to_store_json()?;
        state.primary = Some(contents);
        state.persist_count = state.persist_count.saturating_add(1);
        Ok(())
    }

    fn read_backup(&self, name: &str) -> Result<StoreSnapshot, StoreError> {
        if Self::naming().parse_millis(name).is_none() {
            return Err(StoreError::InvalidBackupName {
                name: name.to_owned(),
                store: STORE_FILE.to_owned(),
            });
        }
        let state = self.lock_state();
        let (_, contents) = state
            .backups
            .iter()
            .find(|(candidate, _)| candidate == name)
            .ok_or_else(|| StoreError::BackupNotFound {
                name: name.to_owned(),
            })?;
        StoreSnapshot::from_json(contents)
    }
}
