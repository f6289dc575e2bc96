//! Lock file guarding a store against concurrent maintenance runs.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::Dir;
use tracing::{debug, warn};

use crate::atomic_io::write_new;
use crate::error::StoreError;

/// Exclusive lock on a store file, held until dropped.
///
/// The lock is a sibling file `.<store>.lock` created with `create_new` and
/// holding the owner's process id. A lock left behind by a killed process
/// must be removed by the operator; the error names its path.
#[derive(Debug)]
pub struct StoreLock {
    dir: Dir,
    name: String,
    path: Utf8PathBuf,
}

impl StoreLock {
    pub(crate) fn acquire(
        dir: &Dir,
        dir_path: &Utf8Path,
        store_file: &str,
    ) -> Result<Self, StoreError> {
        let name = lock_file_name(store_file);
        let path = dir_path.join(&name);
        let owner = format!("{}\n", std::process::id());

        match write_new(dir, &name, &owner) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked {
                    path: dir_path.join(store_file),
                    lock_path: path,
                });
            }
            Err(err) => {
                return Err(StoreError::Write {
                    path,
                    message: err.to_string(),
                });
            }
        }

        let handle = dir.try_clone().map_err(|err| {
            drop(dir.remove_file(&name));
            StoreError::Write {
                path: path.clone(),
                message: err.to_string(),
            }
        })?;
        debug!(lock = %path, "store lock acquired");

        Ok(Self {
            dir: handle,
            name,
            path,
        })
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = self.dir.remove_file(&self.name) {
            warn!(lock = %self.path, error = %err, "failed to remove store lock");
        }
    }
}

fn lock_file_name(store_file: &str) -> String {
    format!(".{store_file}.lock")
}
