//! Maintenance tooling for the listen-together party store.
//!
//! The store is a single JSON document holding users, parties, and the
//! memberships linking them. This crate backs that document up, removes
//! duplicate memberships, and rewrites it atomically so a crashed run never
//! leaves a half-written store behind.
//!
//! # Overview
//!
//! - [`BackupNaming`] and [`BackupSequence`] name timestamped backups.
//! - [`dedup_memberships`] keeps the first membership per key, in order.
//! - [`Reconciler`] locks the store, backs it up, dedups, rewrites, and
//!   verifies the result.
//! - [`audit_snapshot`] reports integrity problems without writing.
//! - [`restore_from_backup`] rolls the store back to a backup.
//!
//! # Example
//!
//! ```
//! use party_maintenance::{MalformedPolicy, StoreSnapshot, UserPartyKey, dedup_memberships};
//!
//! let snapshot = StoreSnapshot::from_json(
//!     r#"{
//!         "users": [{"id": "u1", "email": "ada@example.com"}],
//!         "parties": [{"id": "p1", "code": "JAMS", "hostUserId": "u1"}],
//!         "memberships": [
//!             {"userId": "u1", "partyId": "p1", "role": "host"},
//!             {"userId": "u1", "partyId": "p1", "role": "guest"}
//!         ]
//!     }"#,
//! )
//! .expect("valid store");
//!
//! let outcome = dedup_memberships(snapshot.memberships(), &UserPartyKey, MalformedPolicy::Keep);
//!
//! assert_eq!(outcome.retained().len(), 1);
//! assert_eq!(outcome.dropped().first().map(|d| d.kept_index), Some(0));
//! ```

mod atomic_io;
mod audit;
mod backup;
pub mod cli;
mod config;
mod dedup;
mod error;
mod logging;
mod model;
mod reconcile;
mod store;
#[cfg(test)]
mod test_support;

pub use audit::{
    AuditReport, MissingReference, OrphanedMembership, SharedValue, audit_snapshot, audit_store,
};
pub use backup::{BackupNaming, BackupReceipt, BackupSequence};
pub use config::{ConfigError, MaintenanceSettings};
pub use dedup::{
    DedupOutcome, DroppedRecord, ExactRecordKey, KeyStrategy, KeyStrategyKind, MalformedPolicy,
    MembershipKey, UserPartyKey, dedup_memberships,
};
pub use error::{MalformedReason, MalformedRecord, ReconcileError, RecordKind, StoreError};
pub use logging::init_tracing;
pub use model::{Membership, Party, RecordCounts, StoreSnapshot, StreamingServiceProfile, User};
pub use reconcile::{
    ReconcileOptions, ReconcilePhase, ReconcileReport, Reconciler, RestoreReport,
    restore_from_backup,
};
pub use store::{InMemoryLockGuard, InMemoryStore, JsonFileStore, PartyStore, StoreLock};
