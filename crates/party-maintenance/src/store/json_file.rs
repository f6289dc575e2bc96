//! JSON file adapter for the party store.

use std::io;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Dir};
use mockable::Clock;
use tracing::{debug, info};

use super::{PartyStore, StoreLock, confirm_backup};
use crate::atomic_io::{write_atomic, write_new};
use crate::backup::{BackupNaming, BackupReceipt, BackupSequence};
use crate::error::StoreError;
use crate::model::StoreSnapshot;

/// Attempts at claiming a fresh backup name before giving up.
const MAX_BACKUP_ATTEMPTS: usize = 16;

/// Party store kept as one JSON document on disk.
///
/// All file access goes through a capability handle on the store's parent
/// directory; backups, the lock file, and temporary files are siblings of
/// the store file.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: Dir,
    dir_path: Utf8PathBuf,
    naming: BackupNaming,
    sequence: BackupSequence,
}

impl JsonFileStore {
    /// Opens the store at `path`, using `clock` to timestamp backups.
    ///
    /// The store file itself need not exist yet; its directory must.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] if `path` does not end in a file
    /// name, or [`StoreError::Io`] if the directory cannot be opened.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use camino::Utf8PathBuf;
    /// use mockable::DefaultClock;
    /// use party_maintenance::{JsonFileStore, PartyStore};
    ///
    /// let dir = tempfile::tempdir().expect("temp dir");
    /// let path = Utf8PathBuf::from_path_buf(dir.path().join("data.json")).expect("utf-8 path");
    /// std::fs::write(&path, r#"{"users": [], "parties": [], "memberships": []}"#).expect("seed");
    ///
    /// let store = JsonFileStore::open(&path, Arc::new(DefaultClock)).expect("open store");
    /// assert_eq!(store.load().expect("load").counts().memberships, 0);
    /// ```
    pub fn open(path: &Utf8Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let Some(Utf8Component::Normal(file_name)) = path.components().next_back() else {
            return Err(StoreError::InvalidPath {
                path: path.to_path_buf(),
            });
        };
        let dir_path = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority()).map_err(|err| {
            StoreError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        Ok(Self {
            dir,
            dir_path,
            naming: BackupNaming::for_store(file_name),
            sequence: BackupSequence::new(clock),
        })
    }

    /// Returns the path of the primary store file.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.dir_path.join(self.naming.store_file())
    }

    /// Returns the path a backup with file name `name` lives at.
    #[must_use]
    pub fn backup_path(&self, name: &str) -> Utf8PathBuf {
        self.dir_path.join(name)
    }

    fn read_file(&self, name: &str) -> Result<String, io::Error> {
        self.dir.read_to_string(name)
    }
}

impl PartyStore for JsonFileStore {
    type Guard = StoreLock;

    fn location(&self) -> String {
        self.path().into_string()
    }

    fn lock(&self) -> Result<StoreLock, StoreError> {
        StoreLock::acquire(&self.dir, &self.dir_path, self.naming.store_file())
    }

    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let contents =
            self.read_file(self.naming.store_file())
                .map_err(|err| StoreError::Io {
                    path: self.path(),
                    message: err.to_string(),
                })?;
        StoreSnapshot::from_json(&contents)
    }

    fn backup(&self, snapshot: &StoreSnapshot) -> Result<BackupReceipt, StoreError> {
        let contents = snapshot.to_store_json()?;

        for _ in 0..MAX_BACKUP_ATTEMPTS {
            let millis = self.sequence.next_millis();
            let name = self.naming.name_for(millis);
            let path = self.backup_path(&name);

            match write_new(&self.dir, &name, &contents) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(backup = %path, "backup name taken; advancing timestamp");
                    continue;
                }
                Err(err) => {
                    return Err(StoreError::Backup {
                        path,
                        message: err.to_string(),
                    });
                }
            }

            let read_back = self.read_file(&name).map_err(|err| StoreError::Backup {
                path: path.clone(),
                message: err.to_string(),
            })?;
            let membership_count = confirm_backup(snapshot, &read_back, &path)?;
            info!(backup = %path, membership_count, "backup written");

            return Ok(BackupReceipt {
                name,
                millis,
                membership_count,
            });
        }

        Err(StoreError::Backup {
            path: self.path(),
            message: format!("no free backup name after {MAX_BACKUP_ATTEMPTS} attempts"),
        })
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let contents = snapshot.to_store_json()?;
        write_atomic(&self.dir, &self.dir_path, self.naming.store_file(), &contents)?;
        info!(store = %self.path(), "store rewritten");
        Ok(())
    }

    fn read_backup(&self, name: &str) -> Result<StoreSnapshot, StoreError> {
        if self.naming.parse_millis(name).is_none() {
            return Err(StoreError::InvalidBackupName {
                name: name.to_owned(),
                store: self.naming.store_file().to_owned(),
            });
        }
        let contents = self.read_file(name).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::BackupNotFound {
                    name: name.to_owned(),
                }
            } else {
                StoreError::Io {
                    path: self.backup_path(name),
                    message: err.to_string(),
                }
            }
        })?;
        StoreSnapshot::from_json(&contents)
    }
}
