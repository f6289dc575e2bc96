//! Membership deduplication.
//!
//! Each membership record is mapped to a structured [`MembershipKey`] by a
//! pluggable [`KeyStrategy`]. Keys are compared component-wise, so ids that
//! contain hyphens or any other delimiter can never make two distinct pairs
//! collide. The first record bearing a key is retained; later records with
//! the same key are dropped without merging.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use clap::ValueEnum;
use serde_json::Value;

use crate::error::MalformedRecord;
use crate::model::Membership;

/// Canonical uniqueness key of a membership record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MembershipKey {
    /// The `(userId, partyId)` pair.
    Pair {
        /// Member user id.
        user_id: String,
        /// Joined party id.
        party_id: String,
    },
    /// Canonical JSON of the whole record.
    Record(String),
}

impl fmt::Display for MembershipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair { user_id, party_id } => write!(f, "({user_id:?}, {party_id:?})"),
            Self::Record(json) => f.write_str(json),
        }
    }
}

/// Maps a validated membership to its uniqueness key.
pub trait KeyStrategy: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Derives the key for `membership`, whose raw form is `record`.
    fn key_for(&self, membership: &Membership, record: &Value) -> MembershipKey;
}

/// Keys memberships by their `(userId, partyId)` pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserPartyKey;

impl KeyStrategy for UserPartyKey {
    fn name(&self) -> &'static str {
        "user-party"
    }

    fn key_for(&self, membership: &Membership, _record: &Value) -> MembershipKey {
        MembershipKey::Pair {
            user_id: membership.user_id.clone(),
            party_id: membership.party_id.clone(),
        }
    }
}

/// Keys memberships by their full contents; only identical copies collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactRecordKey;

impl KeyStrategy for ExactRecordKey {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn key_for(&self, _membership: &Membership, record: &Value) -> MembershipKey {
        let mut canonical = String::new();
        write_canonical(&mut canonical, record);
        MembershipKey::Record(canonical)
    }
}

/// Writes `value` as compact JSON with object keys sorted at every level.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));
            out.push('{');
            for (position, (key, item)) in entries.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Selectable key strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KeyStrategyKind {
    /// Deduplicate on the `(userId, partyId)` pair.
    #[default]
    UserParty,
    /// Deduplicate identical records only.
    Exact,
}

impl KeyStrategyKind {
    /// Returns the strategy implementation.
    #[must_use]
    pub fn strategy(self) -> Box<dyn KeyStrategy> {
        match self {
            Self::UserParty => Box::new(UserPartyKey),
            Self::Exact => Box::new(ExactRecordKey),
        }
    }

    /// Parses a strategy name as written in configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use party_maintenance::KeyStrategyKind;
    ///
    /// assert_eq!(KeyStrategyKind::from_name("exact"), Some(KeyStrategyKind::Exact));
    /// assert_eq!(KeyStrategyKind::from_name("hyphen"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }
}

/// What to do with records that cannot be keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Leave malformed records in place in the output.
    #[default]
    Keep,
    /// Exclude malformed records from the output.
    Drop,
}

/// A duplicate removed from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    /// Position of the dropped record in the input.
    pub index: usize,
    /// Position of the earlier record that was retained for the same key.
    pub kept_index: usize,
    /// Shared key.
    pub key: MembershipKey,
}

/// Result of a deduplication pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome {
    input_count: usize,
    retained: Vec<Value>,
    dropped: Vec<DroppedRecord>,
    malformed: Vec<MalformedRecord>,
}

impl DedupOutcome {
    /// Returns the number of input records.
    #[must_use]
    pub const fn input_count(&self) -> usize {
        self.input_count
    }

    /// Returns the retained records in input order.
    #[must_use]
    pub fn retained(&self) -> &[Value] {
        &self.retained
    }

    /// Consumes the outcome and returns the retained records.
    #[must_use]
    pub fn into_retained(self) -> Vec<Value> {
        self.retained
    }

    /// Returns the dropped duplicates in input order.
    #[must_use]
    pub fn dropped(&self) -> &[DroppedRecord] {
        &self.dropped
    }

    /// Returns the number of dropped duplicates.
    #[must_use]
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// Returns the records that could not be keyed.
    #[must_use]
    pub fn malformed(&self) -> &[MalformedRecord] {
        &self.malformed
    }

    /// Returns `true` if the output differs from the input.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.retained.len() != self.input_count
    }
}

/// Removes duplicate memberships, keeping the first record for each key.
///
/// Retained records keep their relative order. Malformed records are
/// reported and handled according to `policy`; they never abort the pass.
///
/// # Example
///
/// ```
/// use party_maintenance::{MalformedPolicy, UserPartyKey, dedup_memberships};
/// use serde_json::json;
///
/// let records = vec![
///     json!({"userId": "u1", "partyId": "p1"}),
///     json!({"userId": "u2", "partyId": "p1"}),
///     json!({"userId": "u1", "partyId": "p1"}),
/// ];
/// let outcome = dedup_memberships(&records, &UserPartyKey, MalformedPolicy::Keep);
///
/// assert_eq!(outcome.retained().len(), 2);
/// assert_eq!(outcome.dropped_count(), 1);
/// ```
#[must_use]
pub fn dedup_memberships(
    records: &[Value],
    strategy: &dyn KeyStrategy,
    policy: MalformedPolicy,
) -> DedupOutcome {
    let mut first_seen: HashMap<MembershipKey, usize> = HashMap::with_capacity(records.len());
    let mut retained = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();
    let mut malformed = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let membership = match Membership::from_record(index, record) {
            Ok(membership) => membership,
            Err(err) => {
                malformed.push(err);
                if policy == MalformedPolicy::Keep {
                    retained.push(record.clone());
                }
                continue;
            }
        };

        match first_seen.entry(strategy.key_for(&membership, record)) {
            Entry::Vacant(slot) => {
                slot.insert(index);
                retained.push(record.clone());
            }
            Entry::Occupied(slot) => dropped.push(DroppedRecord {
                index,
                kept_index: *slot.get(),
                key: slot.key().clone(),
            }),
        }
    }

    DedupOutcome {
        input_count: records.len(),
        retained,
        dropped,
        malformed,
    }
}
