//! Error types for the party-maintenance crate.
//!
//! This module defines semantic error enums for store access, per-record
//! validation, and the reconciliation flow, following the project's error
//! handling conventions with `thiserror`.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while reading, locking, backing up, or rewriting the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store file could not be read.
    #[error("failed to read store file at '{path}': {message}")]
    Io {
        /// Path to the store file.
        path: Utf8PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// The store JSON is malformed or a user/party record is invalid.
    #[error("invalid store JSON: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
    },

    /// Another maintenance run holds the store lock.
    #[error("store at '{path}' is locked by another run; remove '{lock_path}' if it is stale")]
    Locked {
        /// Path to the store file.
        path: Utf8PathBuf,
        /// Path to the lock file.
        lock_path: Utf8PathBuf,
    },

    /// The backup artifact could not be written or confirmed.
    #[error("backup failed at '{path}': {message}")]
    Backup {
        /// Path of the backup artifact (or the store when no name was issued).
        path: Utf8PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The primary store could not be rewritten.
    #[error("failed to write store file at '{path}': {message}")]
    Write {
        /// Path to the file being written.
        path: Utf8PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// The configured store path does not name a file.
    #[error("store path '{path}' must name a file")]
    InvalidPath {
        /// The rejected path.
        path: Utf8PathBuf,
    },

    /// The requested backup artifact does not exist.
    #[error("backup '{name}' not found")]
    BackupNotFound {
        /// File name of the missing backup.
        name: String,
    },

    /// The supplied name does not follow the store's backup naming scheme.
    #[error("'{name}' is not a backup of store '{store}'")]
    InvalidBackupName {
        /// Rejected file name.
        name: String,
        /// File name of the primary store.
        store: String,
    },
}

/// Collection a store record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A `users` entry.
    User,
    /// A `parties` entry.
    Party,
    /// A `memberships` entry.
    Membership,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Party => "party",
            Self::Membership => "membership",
        };
        f.write_str(name)
    }
}

/// Why a store record could not be read as its typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// The record is not a JSON object.
    NotAnObject,
    /// A required field is absent or `null`.
    MissingField(&'static str),
    /// A field holds a value of the wrong JSON type.
    InvalidField(&'static str),
    /// An identifier field is empty or whitespace-only.
    EmptyField(&'static str),
    /// A nested object does not have the expected shape.
    InvalidObject(&'static str),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => f.write_str("record is not an object"),
            Self::MissingField(field) => write!(f, "missing field '{field}'"),
            Self::InvalidField(field) => write!(f, "field '{field}' must be a string"),
            Self::EmptyField(field) => write!(f, "field '{field}' is empty"),
            Self::InvalidObject(field) => write!(f, "field '{field}' has an unexpected shape"),
        }
    }
}

/// A record that does not match its expected shape.
///
/// Malformed records are reported per record and never abort a run; they
/// are left in the store untouched unless they are memberships and the run
/// drops malformed memberships.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {kind} at index {index}: {reason}")]
pub struct MalformedRecord {
    /// Collection holding the record.
    pub kind: RecordKind,
    /// Position of the record in its collection.
    pub index: usize,
    /// Validation failure.
    pub reason: MalformedReason,
}

/// Errors that abort a reconciliation or restore run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Store access failed; the primary store is untouched unless the
    /// failure happened while persisting.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The rewritten store did not read back with the expected contents.
    #[error(
        "verification failed: expected {expected} {collection} but found {actual}; restore from backup '{backup}'"
    )]
    Verification {
        /// Collection whose record count did not match.
        collection: &'static str,
        /// Expected record count.
        expected: usize,
        /// Record count read back from the store.
        actual: usize,
        /// Backup artifact holding the pre-run state.
        backup: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_io_formats_correctly() {
        let err = StoreError::Io {
            path: Utf8PathBuf::from("/srv/data.json"),
            message: "file not found".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read store file at '/srv/data.json': file not found"
        );
    }

    #[test]
    fn store_error_locked_names_lock_file() {
        let err = StoreError::Locked {
            path: Utf8PathBuf::from("data.json"),
            lock_path: Utf8PathBuf::from(".data.json.lock"),
        };
        assert!(err.to_string().contains("'.data.json.lock'"));
    }

    #[test]
    fn malformed_record_formats_reason() {
        let err = MalformedRecord {
            kind: RecordKind::Membership,
            index: 3,
            reason: MalformedReason::MissingField("userId"),
        };
        assert_eq!(
            err.to_string(),
            "malformed membership at index 3: missing field 'userId'"
        );
    }

    #[test]
    fn malformed_user_names_its_collection() {
        let err = MalformedRecord {
            kind: RecordKind::User,
            index: 0,
            reason: MalformedReason::InvalidField("email"),
        };
        assert_eq!(
            err.to_string(),
            "malformed user at index 0: field 'email' must be a string"
        );
    }

    #[test]
    fn verification_error_names_backup() {
        let err = ReconcileError::Verification {
            collection: "memberships",
            expected: 2,
            actual: 0,
            backup: "data.backup.1700000000000.json".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "verification failed: expected 2 memberships but found 0; restore from backup 'data.backup.1700000000000.json'"
        );
    }
}
