//! Read-only integrity audit of a store snapshot.
//!
//! The audit reports, without changing anything, every violation the
//! maintenance tooling knows about: duplicate memberships, malformed
//! records in any collection, memberships pointing at users or parties that
//! no longer exist, party codes shared by several parties, and user emails
//! registered twice.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::dedup::{DroppedRecord, KeyStrategy, MalformedPolicy, dedup_memberships};
use crate::error::{MalformedRecord, StoreError};
use crate::model::{Membership, Party, StoreSnapshot, User};
use crate::store::PartyStore;

/// Which side of a membership references a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    /// The user does not exist.
    User,
    /// The party does not exist.
    Party,
    /// Neither the user nor the party exists.
    Both,
}

/// A membership whose user or party is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedMembership {
    /// Position of the membership in the store.
    pub index: usize,
    /// Referenced user id.
    pub user_id: String,
    /// Referenced party id.
    pub party_id: String,
    /// Which reference is dangling.
    pub missing: MissingReference,
}

/// A value shared by records that should each hold a distinct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedValue {
    /// The repeated value.
    pub value: String,
    /// Positions of the records holding it.
    pub indices: Vec<usize>,
}

/// Findings of an audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Name of the key strategy used to detect duplicates.
    pub strategy: &'static str,
    /// Number of membership records inspected.
    pub membership_count: usize,
    /// Duplicate memberships a reconciliation would drop.
    pub duplicate_memberships: Vec<DroppedRecord>,
    /// Memberships that cannot be keyed.
    pub malformed_memberships: Vec<MalformedRecord>,
    /// User records missing an id or holding mistyped fields.
    pub malformed_users: Vec<MalformedRecord>,
    /// Party records missing an id, code, or host.
    pub malformed_parties: Vec<MalformedRecord>,
    /// Memberships referencing missing users or parties.
    pub orphaned_memberships: Vec<OrphanedMembership>,
    /// Party codes used by more than one party.
    pub duplicate_party_codes: Vec<SharedValue>,
    /// User emails (compared case-insensitively) used by more than one user.
    pub duplicate_user_emails: Vec<SharedValue>,
}

impl AuditReport {
    /// Returns `true` if no finding was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicate_memberships.is_empty()
            && self.malformed_memberships.is_empty()
            && self.malformed_users.is_empty()
            && self.malformed_parties.is_empty()
            && self.orphaned_memberships.is_empty()
            && self.duplicate_party_codes.is_empty()
            && self.duplicate_user_emails.is_empty()
    }
}

/// Audits `snapshot`, detecting duplicate memberships with `strategy`.
#[must_use]
pub fn audit_snapshot(snapshot: &StoreSnapshot, strategy: &dyn KeyStrategy) -> AuditReport {
    let dedup = dedup_memberships(snapshot.memberships(), strategy, MalformedPolicy::Keep);
    let (users, malformed_users) = views(snapshot.users(), User::from_record);
    let (parties, malformed_parties) = views(snapshot.parties(), Party::from_record);

    AuditReport {
        strategy: strategy.name(),
        membership_count: snapshot.memberships().len(),
        duplicate_memberships: dedup.dropped().to_vec(),
        malformed_memberships: dedup.malformed().to_vec(),
        malformed_users,
        malformed_parties,
        orphaned_memberships: find_orphans(snapshot),
        duplicate_party_codes: shared_values(
            parties
                .into_iter()
                .map(|(index, party)| (index, party.code)),
        ),
        duplicate_user_emails: shared_values(users.into_iter().filter_map(|(index, user)| {
            user.email
                .map(|email| (index, email.trim().to_lowercase()))
        })),
    }
}

fn views<T>(
    records: &[Value],
    parse: fn(usize, &Value) -> Result<T, MalformedRecord>,
) -> (Vec<(usize, T)>, Vec<MalformedRecord>) {
    let mut valid = Vec::new();
    let mut malformed = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match parse(index, record) {
            Ok(view) => valid.push((index, view)),
            Err(err) => malformed.push(err),
        }
    }
    (valid, malformed)
}

/// Loads the store and audits it. No lock is taken and nothing is written.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot be loaded.
pub fn audit_store<S: PartyStore>(
    store: &S,
    strategy: &dyn KeyStrategy,
) -> Result<AuditReport, StoreError> {
    let snapshot = store.load()?;
    let report = audit_snapshot(&snapshot, strategy);
    tracing::info!(
        store = %store.location(),
        duplicates = report.duplicate_memberships.len(),
        malformed = report.malformed_memberships.len(),
        malformed_users = report.malformed_users.len(),
        malformed_parties = report.malformed_parties.len(),
        orphaned = report.orphaned_memberships.len(),
        "store audited"
    );
    Ok(report)
}

fn find_orphans(snapshot: &StoreSnapshot) -> Vec<OrphanedMembership> {
    let users = record_ids(snapshot.users());
    let parties = record_ids(snapshot.parties());

    snapshot
        .memberships()
        .iter()
        .enumerate()
        .filter_map(|(index, record)| Membership::from_record(index, record).ok().map(|m| (index, m)))
        .filter_map(|(index, membership)| {
            let missing = match (
                users.contains(membership.user_id.as_str()),
                parties.contains(membership.party_id.as_str()),
            ) {
                (true, true) => return None,
                (false, true) => MissingReference::User,
                (true, false) => MissingReference::Party,
                (false, false) => MissingReference::Both,
            };
            Some(OrphanedMembership {
                index,
                user_id: membership.user_id,
                party_id: membership.party_id,
                missing,
            })
        })
        .collect()
}

/// Ids of records holding a string `id`, whether or not they are otherwise
/// well formed.
fn record_ids(records: &[Value]) -> HashSet<&str> {
    records
        .iter()
        .filter_map(|record| record.get("id").and_then(Value::as_str))
        .collect()
}

fn shared_values(values: impl Iterator<Item = (usize, String)>) -> Vec<SharedValue> {
    let mut order = Vec::new();
    let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, value) in values {
        let slot = positions.entry(value.clone()).or_default();
        if slot.is_empty() {
            order.push(value);
        }
        slot.push(index);
    }

    order
        .into_iter()
        .filter_map(|value| {
            let indices = positions.remove(&value)?;
            (indices.len() > 1).then_some(SharedValue { value, indices })
        })
        .collect()
}
