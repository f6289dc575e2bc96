//! Store records and the in-memory snapshot of the whole store.
//!
//! The snapshot holds the store document as raw JSON, so a record this tool
//! does not understand never prevents the rest of the store from loading
//! and survives a rewrite exactly as written, explicit `null`s and key order
//! included. [`User::from_record`], [`Party::from_record`] and
//! [`Membership::from_record`] derive validated views per record on demand.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{MalformedReason, MalformedRecord, RecordKind, StoreError};

const USERS: &str = "users";
const PARTIES: &str = "parties";
const MEMBERSHIPS: &str = "memberships";

/// Linked streaming-service account (for example Spotify) owned by one user.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingServiceProfile {
    /// OAuth access token.
    pub access_token: String,
    /// OAuth refresh token.
    pub refresh_token: String,
    /// Granted OAuth scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Display name on the streaming service.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Token expiry as written by the web app.
    #[serde(default)]
    pub expiry: Option<Value>,
    /// Fields this tool does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for StreamingServiceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingServiceProfile")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("display_name", &self.display_name)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Validated view of one user record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Opaque internal key.
    pub id: String,
    /// Natural external identifier; accounts created through some OAuth
    /// providers have none.
    pub email: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub image: Option<String>,
    /// Connected Spotify account, if any.
    pub spotify_profile: Option<StreamingServiceProfile>,
}

impl User {
    /// Validates a raw user record found at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] when the record is not an object, `id` is
    /// missing or empty, a text field holds a non-string value, or
    /// `spotifyProfile` lacks its tokens.
    ///
    /// # Example
    ///
    /// ```
    /// use party_maintenance::User;
    /// use serde_json::json;
    ///
    /// let user = User::from_record(0, &json!({"id": "u1", "email": null})).expect("valid user");
    /// assert_eq!(user.email, None);
    /// ```
    pub fn from_record(index: usize, record: &Value) -> Result<Self, MalformedRecord> {
        let malformed = |reason| MalformedRecord {
            kind: RecordKind::User,
            index,
            reason,
        };
        let fields = object_fields(record).map_err(malformed)?;

        let spotify_profile = match fields.get("spotifyProfile") {
            None | Some(Value::Null) => None,
            Some(profile) => Some(
                StreamingServiceProfile::deserialize(profile)
                    .map_err(|_| malformed(MalformedReason::InvalidObject("spotifyProfile")))?,
            ),
        };

        Ok(Self {
            id: required_id(fields, "id").map_err(malformed)?,
            email: optional_string(fields, "email").map_err(malformed)?,
            name: optional_string(fields, "name").map_err(malformed)?,
            image: optional_string(fields, "image").map_err(malformed)?,
            spotify_profile,
        })
    }
}

/// Validated view of one party record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    /// Opaque internal key.
    pub id: String,
    /// Short human-shareable join token.
    pub code: String,
    /// User hosting the party.
    pub host_user_id: String,
    /// Creation timestamp as written by the web app.
    pub created_at: Option<String>,
}

impl Party {
    /// Validates a raw party record found at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] when the record is not an object, `id`,
    /// `code` or `hostUserId` is missing or empty, or `createdAt` holds a
    /// non-string value.
    pub fn from_record(index: usize, record: &Value) -> Result<Self, MalformedRecord> {
        let malformed = |reason| MalformedRecord {
            kind: RecordKind::Party,
            index,
            reason,
        };
        let fields = object_fields(record).map_err(malformed)?;

        Ok(Self {
            id: required_id(fields, "id").map_err(malformed)?,
            code: required_id(fields, "code").map_err(malformed)?,
            host_user_id: required_id(fields, "hostUserId").map_err(malformed)?,
            created_at: optional_string(fields, "createdAt").map_err(malformed)?,
        })
    }
}

/// Validated view of one membership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Member user id.
    pub user_id: String,
    /// Joined party id.
    pub party_id: String,
    /// Join timestamp, when present.
    pub joined_at: Option<String>,
    /// Member role, when present.
    pub role: Option<String>,
}

impl Membership {
    /// Validates a raw membership record found at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] when the record is not an object, when
    /// `userId` or `partyId` is missing, empty or not a string, or when
    /// `joinedAt` or `role` holds a non-string value.
    ///
    /// # Example
    ///
    /// ```
    /// use party_maintenance::Membership;
    /// use serde_json::json;
    ///
    /// let record = json!({"userId": "u1", "partyId": "p1", "role": "guest"});
    /// let membership = Membership::from_record(0, &record).expect("valid record");
    /// assert_eq!(membership.user_id, "u1");
    ///
    /// let broken = json!({"partyId": "p1"});
    /// assert!(Membership::from_record(1, &broken).is_err());
    /// ```
    pub fn from_record(index: usize, record: &Value) -> Result<Self, MalformedRecord> {
        let malformed = |reason| MalformedRecord {
            kind: RecordKind::Membership,
            index,
            reason,
        };
        let fields = object_fields(record).map_err(malformed)?;

        Ok(Self {
            user_id: required_id(fields, "userId").map_err(malformed)?,
            party_id: required_id(fields, "partyId").map_err(malformed)?,
            joined_at: optional_string(fields, "joinedAt").map_err(malformed)?,
            role: optional_string(fields, "role").map_err(malformed)?,
        })
    }
}

const fn object_fields(record: &Value) -> Result<&Map<String, Value>, MalformedReason> {
    match record {
        Value::Object(fields) => Ok(fields),
        _ => Err(MalformedReason::NotAnObject),
    }
}

fn required_id(fields: &Map<String, Value>, field: &'static str) -> Result<String, MalformedReason> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(MalformedReason::MissingField(field)),
        Some(Value::String(value)) if value.trim().is_empty() => {
            Err(MalformedReason::EmptyField(field))
        }
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(MalformedReason::InvalidField(field)),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, MalformedReason> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(MalformedReason::InvalidField(field)),
    }
}

/// Record counts per collection, used to confirm backups and rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCounts {
    /// Number of user records, well-formed or not.
    pub users: usize,
    /// Number of party records, well-formed or not.
    pub parties: usize,
    /// Number of membership records, well-formed or not.
    pub memberships: usize,
}

/// In-memory representation of the entire persisted store.
///
/// A snapshot parsed from text remembers that text until its memberships
/// change, so backups and restores write the store back byte for byte.
/// Equality compares documents, not source text.
///
/// # Example
///
/// ```
/// use party_maintenance::StoreSnapshot;
///
/// let text = r#"{"users": [], "parties": [], "memberships": [{"userId": "u1", "partyId": "p1"}]}"#;
/// let snapshot = StoreSnapshot::from_json(text).expect("valid store");
/// assert_eq!(snapshot.counts().memberships, 1);
/// assert_eq!(snapshot.to_store_json().expect("text"), text);
/// ```
#[derive(Clone, Default)]
pub struct StoreSnapshot {
    document: Map<String, Value>,
    source: Option<String>,
}

impl StoreSnapshot {
    /// Builds a snapshot from its collections.
    #[must_use]
    pub fn new(users: Vec<Value>, parties: Vec<Value>, memberships: Vec<Value>) -> Self {
        let mut document = Map::new();
        document.insert(USERS.to_owned(), Value::Array(users));
        document.insert(PARTIES.to_owned(), Value::Array(parties));
        document.insert(MEMBERSHIPS.to_owned(), Value::Array(memberships));
        Self {
            document,
            source: None,
        }
    }

    /// Parses a snapshot from the store's JSON text.
    ///
    /// Individual records are not validated here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] when the text is not a JSON object or a
    /// collection is present but not an array.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let value: Value = serde_json::from_str(json).map_err(|err| StoreError::Parse {
            message: err.to_string(),
        })?;
        let Value::Object(document) = value else {
            return Err(StoreError::Parse {
                message: "store must be a JSON object".to_owned(),
            });
        };
        for key in [USERS, PARTIES, MEMBERSHIPS] {
            match document.get(key) {
                None | Some(Value::Null | Value::Array(_)) => {}
                Some(_) => {
                    return Err(StoreError::Parse {
                        message: format!("'{key}' must be an array"),
                    });
                }
            }
        }

        Ok(Self {
            document,
            source: Some(json.to_owned()),
        })
    }

    /// Serialises the document as pretty-printed JSON with a trailing
    /// newline, keeping key order and `null` values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] if serialisation fails.
    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        let mut json =
            serde_json::to_string_pretty(&self.document).map_err(|err| StoreError::Parse {
                message: err.to_string(),
            })?;
        json.push('\n');
        Ok(json)
    }

    /// Returns the text to write for this snapshot: the exact text it was
    /// parsed from while unchanged, pretty-printed JSON otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] if serialisation fails.
    pub fn to_store_json(&self) -> Result<String, StoreError> {
        match &self.source {
            Some(source) => Ok(source.clone()),
            None => self.to_json_pretty(),
        }
    }

    /// Returns the text this snapshot was parsed from, if still unchanged.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns the raw user records.
    #[must_use]
    pub fn users(&self) -> &[Value] {
        self.collection(USERS)
    }

    /// Returns the raw party records.
    #[must_use]
    pub fn parties(&self) -> &[Value] {
        self.collection(PARTIES)
    }

    /// Returns the raw membership records in file order.
    #[must_use]
    pub fn memberships(&self) -> &[Value] {
        self.collection(MEMBERSHIPS)
    }

    /// Returns a snapshot identical to this one except for its memberships.
    ///
    /// Everything else in the document is kept as loaded. Passing the
    /// current memberships returns the snapshot unchanged.
    #[must_use]
    pub fn with_memberships(mut self, memberships: Vec<Value>) -> Self {
        if self.memberships() == memberships.as_slice() {
            return self;
        }
        self.source = None;
        self.document
            .insert(MEMBERSHIPS.to_owned(), Value::Array(memberships));
        self
    }

    /// Returns the record count of each collection.
    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        RecordCounts {
            users: self.users().len(),
            parties: self.parties().len(),
            memberships: self.memberships().len(),
        }
    }

    fn collection(&self, key: &str) -> &[Value] {
        match self.document.get(key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }
}

impl PartialEq for StoreSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

impl fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSnapshot")
            .field("counts", &self.counts())
            .field("from_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}
