//! Atomic and exclusive file writes inside a capability-scoped directory.
//!
//! [`write_atomic`] replaces a file through a temporary sibling and a rename,
//! so the target is never observed half-written. [`write_new`] creates a file
//! that must not already exist, which is how backups and lock files claim
//! their names.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8Path;
use cap_std::fs::{Dir, OpenOptions};

use crate::error::StoreError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replaces `file_name` inside `dir` with `contents` atomically.
///
/// The contents are written to a hidden temporary file in the same
/// directory, synced, then renamed over the target. A crash at any point
/// leaves either the old file or the new file, never a truncated one.
///
/// # Errors
///
/// Returns [`StoreError::Write`] if the temporary file cannot be written or
/// renamed. The temporary file is removed on failure.
pub(crate) fn write_atomic(
    dir: &Dir,
    dir_path: &Utf8Path,
    file_name: &str,
    contents: &str,
) -> Result<(), StoreError> {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let tmp_name = format!(
        ".{}.tmp.{}.{}.{}",
        file_name,
        std::process::id(),
        suffix,
        counter
    );

    write_new(dir, &tmp_name, contents).map_err(|err| StoreError::Write {
        path: dir_path.join(&tmp_name),
        message: err.to_string(),
    })?;

    if let Err(err) = rename_over(dir, &tmp_name, file_name) {
        if dir.remove_file(&tmp_name).is_err() {
            // Ignore cleanup failures; the rename error is what matters.
        }
        return Err(StoreError::Write {
            path: dir_path.join(file_name),
            message: err.to_string(),
        });
    }
    sync_directory(dir);

    Ok(())
}

/// Creates `file_name` inside `dir` and writes `contents`, failing if the
/// file already exists.
///
/// The file is synced before returning. A partially written file is removed.
///
/// # Errors
///
/// Returns the underlying I/O error; callers inspect
/// [`io::ErrorKind::AlreadyExists`] to detect a name collision.
pub(crate) fn write_new(dir: &Dir, file_name: &str, contents: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = dir.open_with(file_name, &options)?;

    let written = file
        .write_all(contents.as_bytes())
        .and_then(|()| file.sync_all());
    if let Err(err) = written {
        drop(file);
        drop(dir.remove_file(file_name));
        return Err(err);
    }

    Ok(())
}

#[cfg(windows)]
fn rename_over(dir: &Dir, tmp_name: &str, target_name: &str) -> io::Result<()> {
    // Windows rename fails if the target exists, so remove it first.
    match dir.remove_file(target_name) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    dir.rename(tmp_name, dir, target_name)
}

#[cfg(not(windows))]
fn rename_over(dir: &Dir, tmp_name: &str, target_name: &str) -> io::Result<()> {
    dir.rename(tmp_name, dir, target_name)
}

fn sync_directory(dir: &Dir) {
    // Best-effort; not every platform can sync a directory handle.
    if dir.open(".").and_then(|handle| handle.sync_all()).is_err() {
        tracing::debug!("directory sync after rename failed");
    }
}
