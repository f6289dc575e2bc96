//! Integration tests for the JSON file store.
//!
//! These tests drive reconcile, audit, and restore through
//! [`JsonFileStore`] and inspect the files left in the store directory.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clear failure messages"
)]


use std::sync::Arc;

use party_maintenance::{
    ExactRecordKey, JsonFileStore, MissingReference, PartyStore, ReconcileOptions, Reconciler,
    UserPartyKey, audit_store, restore_from_backup,
};
use rstest::rstest;
use serde_json::{Value, json};
use test_support::{FixedClock, list_store_dir, open_store_dir, write_store};

const APP_STORE_JSON: &str = r#"{
    "users": [
        {
            "id": "u1",
            "email": "ada@example.com",
            "name": "Ada",
            "spotifyProfile": {
                "accessToken": "secret-access",
                "refreshToken": "secret-refresh",
                "product": "premium"
            },
            "theme": "dark"
        },
        {"id": "u2", "email": "ADA@example.com "}
    ],
    "parties": [
        {"id": "p1", "code": "JAMS", "hostUserId": "u1", "playlist": ["t1", "t2"]},
        {"id": "p2", "code": "JAMS", "hostUserId": "u2"}
    ],
    "memberships": [
        {"userId": "u1", "partyId": "p1", "joinedAt": "2024-06-10T10:00:00Z", "role": "host"},
        {"userId": "u2", "partyId": "p1", "role": "guest"},
        {"userId": "u1", "partyId": "p1", "joinedAt": "2024-06-10T11:00:00Z", "role": "host"},
        {"userId": "u9", "partyId": "p1"}
    ],
    "schemaVersion": 3
}"#;

fn open(prefix: &str) -> JsonFileStore {
    let path = write_store(prefix, APP_STORE_JSON).expect("write store");
    JsonFileStore::open(&path, FixedClock::shared()).expect("open store")
}

fn store_document(store: &JsonFileStore) -> Value {
    let dir = open_store_dir(&store.path()).expect("open store dir");
    let contents = dir.read_to_string("data.json").expect("read store");
    serde_json::from_str(&contents).expect("store is JSON")
}

#[test]
fn reconcile_preserves_fields_it_does_not_manage() {
    let store = Arc::new(open("preserve"));

    Reconciler::new(Arc::clone(&store), Box::new(UserPartyKey), ReconcileOptions::default())
        .run()
        .expect("reconcile");

    let document = store_document(&store);
    assert_eq!(document.get("schemaVersion"), Some(&json!(3)));
    let users = document.get("users").expect("users kept");
    assert_eq!(
        users.pointer("/0/spotifyProfile/refreshToken"),
        Some(&json!("secret-refresh"))
    );
    assert_eq!(users.pointer("/0/theme"), Some(&json!("dark")));
    assert_eq!(
        document.pointer("/parties/0/playlist"),
        Some(&json!(["t1", "t2"]))
    );
    assert_eq!(
        document.pointer("/memberships/0/joinedAt"),
        Some(&json!("2024-06-10T10:00:00Z"))
    );
}

const NULLABLE_STORE_JSON: &str = r#"{
  "users": [
    {"id": "u1", "email": null, "name": null, "image": null},
    {"id": "u2", "email": "grace@example.com", "spotifyProfile": {"accessToken": "a", "refreshToken": "r", "expiry": null}}
  ],
  "parties": [{"id": "p1", "code": "JAMS", "hostUserId": "u1", "createdAt": null}],
  "memberships": [
    {"userId": "u1", "partyId": "p1", "role": "host"},
    {"userId": "u2", "partyId": "p1"},
    {"userId": "u1", "partyId": "p1", "role": "host"}
  ]
}
"#;

#[test]
fn backup_is_a_byte_copy_and_rewrite_keeps_other_records() {
    let path = write_store("nullable", NULLABLE_STORE_JSON).expect("write store");
    let store = Arc::new(JsonFileStore::open(&path, FixedClock::shared()).expect("open store"));

    let report = Reconciler::new(Arc::clone(&store), Box::new(UserPartyKey), ReconcileOptions::default())
        .run()
        .expect("reconcile");

    let dir = open_store_dir(&path).expect("open store dir");
    let backup = report.backup.expect("backup taken").name;
    assert_eq!(
        dir.read_to_string(&backup).expect("read backup"),
        NULLABLE_STORE_JSON
    );
    let original: Value = serde_json::from_str(NULLABLE_STORE_JSON).expect("original is JSON");
    let rewritten = store_document(&store);
    assert_eq!(rewritten.get("users"), original.get("users"));
    assert_eq!(rewritten.get("parties"), original.get("parties"));
    assert_eq!(
        rewritten.get("memberships"),
        Some(&json!([
            {"userId": "u1", "partyId": "p1", "role": "host"},
            {"userId": "u2", "partyId": "p1"}
        ]))
    );
    let text = dir.read_to_string("data.json").expect("read store");
    assert!(text.find("\"userId\"") < text.find("\"partyId\""));

    restore_from_backup(&*store, &backup).expect("restore");
    assert_eq!(
        dir.read_to_string("data.json").expect("read store"),
        NULLABLE_STORE_JSON
    );
}

#[test]
fn reconcile_leaves_only_store_and_backup_behind() {
    let store = Arc::new(open("leftovers"));

    let report = Reconciler::new(Arc::clone(&store), Box::new(UserPartyKey), ReconcileOptions::default())
        .run()
        .expect("reconcile");

    let backup = report.backup.expect("backup taken").name;
    assert_eq!(
        list_store_dir(&store.path()).expect("list dir"),
        vec![backup, "data.json".to_owned()]
    );
}

#[rstest]
#[case::user_party(true, 3)]
#[case::exact(false, 4)]
fn strategy_decides_what_counts_as_duplicate(#[case] by_pair: bool, #[case] expected: usize) {
    let store = Arc::new(open("strategy"));
    let reconciler = if by_pair {
        Reconciler::new(Arc::clone(&store), Box::new(UserPartyKey), ReconcileOptions::default())
    } else {
        Reconciler::new(Arc::clone(&store), Box::new(ExactRecordKey), ReconcileOptions::default())
    };

    let report = reconciler.run().expect("reconcile");

    assert_eq!(report.after.memberships, expected);
    assert_eq!(store.load().expect("reload").memberships().len(), expected);
}

#[test]
fn audit_reports_every_problem_without_writing() {
    let store = open("audit");
    let before = store_document(&store);

    let report = audit_store(&store, &UserPartyKey).expect("audit");

    assert!(!report.is_clean());
    assert_eq!(report.membership_count, 4);
    assert_eq!(report.duplicate_memberships.len(), 1);
    assert_eq!(report.orphaned_memberships.len(), 1);
    assert_eq!(
        report.orphaned_memberships.first().map(|orphan| orphan.missing),
        Some(MissingReference::User)
    );
    assert_eq!(report.duplicate_party_codes.len(), 1);
    assert_eq!(report.duplicate_user_emails.len(), 1);
    assert_eq!(store_document(&store), before);
    assert_eq!(
        list_store_dir(&store.path()).expect("list dir"),
        vec!["data.json".to_owned()]
    );
}

#[test]
fn restore_undoes_a_reconcile() {
    let store = Arc::new(open("restore"));
    let original = store.load().expect("load");
    let report = Reconciler::new(Arc::clone(&store), Box::new(UserPartyKey), ReconcileOptions::default())
        .run()
        .expect("reconcile");
    let backup = report.backup.expect("backup taken").name;

    let restore = restore_from_backup(&*store, &backup).expect("restore");

    assert_eq!(store.load().expect("reload"), original);
    assert_ne!(restore.safety_backup.name, backup);
    let safety = store
        .read_backup(&restore.safety_backup.name)
        .expect("safety backup readable");
    assert_eq!(safety.memberships().len(), 3);
}
