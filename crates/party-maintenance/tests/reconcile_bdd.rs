//! Behavioural tests for membership reconciliation against a JSON store.
//!
//! These scenarios run the reconciler over real files and check what ends
//! up on disk: the rewritten store, its backup, and nothing else.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clear failure messages"
)]


use std::sync::Arc;

use camino::Utf8PathBuf;
use party_maintenance::{
    BackupNaming, JsonFileStore, PartyStore, ReconcileError, ReconcileOptions, ReconcileReport,
    Reconciler, StoreError, StoreSnapshot, UserPartyKey,
};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use serde_json::{Value, json};
use test_support::{FIXED_MILLIS, FixedClock, list_store_dir, open_store_dir, write_store};

#[derive(Default, ScenarioState)]
struct World {
    store_path: Slot<Utf8PathBuf>,
    first_occurrences: Slot<Vec<Value>>,
    result: Slot<Result<ReconcileReport, ReconcileError>>,
}

#[fixture]
fn world() -> World {
    World::default()
}

#[given("a party store with {total:usize} memberships of which {duplicates:usize} is a duplicate")]
fn a_party_store_with_duplicates(world: &World, total: usize, duplicates: usize) {
    let unique = total - duplicates;
    let first: Vec<Value> = (0..unique)
        .map(|n| json!({"userId": format!("u{n}"), "partyId": "p1", "role": "guest"}))
        .collect();
    let repeats = first.iter().cycle().take(duplicates);
    let memberships: Vec<Value> = first.iter().chain(repeats).cloned().collect();
    let users: Vec<Value> = (0..unique)
        .map(|n| json!({"id": format!("u{n}"), "email": format!("u{n}@example.com")}))
        .collect();

    seed_store(world, &users, &memberships);
    world.first_occurrences.set(first);
}

#[given("a party store with no memberships")]
fn a_party_store_with_no_memberships(world: &World) {
    seed_store(world, &[], &[]);
    world.first_occurrences.set(Vec::new());
}

#[given("a party store with a membership missing its user id")]
fn a_party_store_with_a_malformed_membership(world: &World) {
    let memberships = [
        json!({"partyId": "p1", "role": "guest"}),
        json!({"userId": "u0", "partyId": "p1", "role": "host"}),
    ];
    let users = [json!({"id": "u0", "email": "u0@example.com"})];
    seed_store(world, &users, &memberships);
    world.first_occurrences.set(memberships.to_vec());
}

#[given("another run holds the store lock")]
fn another_run_holds_the_store_lock(world: &World) {
    let path = store_path(world);
    let dir = open_store_dir(&path).expect("open store dir");
    dir.write(".data.json.lock", "4242\n").expect("write lock file");
}

#[when("the store is reconciled")]
fn the_store_is_reconciled(world: &World) {
    run_reconcile(world, ReconcileOptions::default());
}

#[when("the store is reconciled as a dry run")]
fn the_store_is_reconciled_as_a_dry_run(world: &World) {
    run_reconcile(
        world,
        ReconcileOptions {
            dry_run: true,
            ..ReconcileOptions::default()
        },
    );
}

#[then("the run succeeds")]
fn the_run_succeeds(world: &World) {
    let result = world.result.get().expect("run result set");
    let report = result.expect("reconcile should succeed");
    assert_eq!(report.strategy, "user-party");
}

#[then("the store holds {count:usize} memberships")]
fn the_store_holds_memberships(world: &World, count: usize) {
    assert_eq!(load_store(world).memberships().len(), count);
}

#[then("the first occurrence of each membership is kept")]
fn the_first_occurrence_is_kept(world: &World) {
    let expected = world
        .first_occurrences
        .get()
        .expect("first occurrences recorded");
    assert_eq!(load_store(world).memberships(), expected.as_slice());
}

#[then("a backup holding {count:usize} memberships sits beside the store")]
fn a_backup_sits_beside_the_store(world: &World, count: usize) {
    let path = store_path(world);
    let backup = BackupNaming::for_store("data.json").name_for(FIXED_MILLIS);
    let dir = open_store_dir(&path).expect("open store dir");
    let contents = dir.read_to_string(&backup).expect("backup readable");
    let snapshot = StoreSnapshot::from_json(&contents).expect("backup parses");

    assert_eq!(snapshot.memberships().len(), count);
    assert_eq!(backup_names(world), vec![backup]);
}

#[then("{count:usize} malformed membership is reported")]
fn malformed_memberships_are_reported(world: &World, count: usize) {
    let result = world.result.get().expect("run result set");
    let report = result.expect("reconcile should succeed");
    assert_eq!(report.dedup.malformed().len(), count);
}

#[then("no backup sits beside the store")]
fn no_backup_sits_beside_the_store(world: &World) {
    assert!(backup_names(world).is_empty());
}

#[then("the run is refused because the store is locked")]
fn the_run_is_refused(world: &World) {
    let result = world.result.get().expect("run result set");
    let err = result.expect_err("reconcile should be refused");
    assert!(
        matches!(err, ReconcileError::Store(StoreError::Locked { .. })),
        "unexpected error: {err}"
    );
}

#[scenario(path = "tests/features/reconcile.feature", index = 0)]
fn duplicates_are_removed_after_backup(world: World) {
    drop(world);
}

#[scenario(path = "tests/features/reconcile.feature", index = 1)]
fn empty_membership_list_is_backed_up(world: World) {
    drop(world);
}

#[scenario(path = "tests/features/reconcile.feature", index = 2)]
fn malformed_memberships_are_kept(world: World) {
    drop(world);
}

#[scenario(path = "tests/features/reconcile.feature", index = 3)]
fn dry_run_leaves_directory_untouched(world: World) {
    drop(world);
}

#[scenario(path = "tests/features/reconcile.feature", index = 4)]
fn locked_store_is_refused(world: World) {
    drop(world);
}

fn seed_store(world: &World, users: &[Value], memberships: &[Value]) {
    let document = json!({
        "users": users,
        "parties": [{"id": "p1", "code": "JAMS", "hostUserId": "u0"}],
        "memberships": memberships,
    });
    let path = write_store("reconcile", &document.to_string()).expect("write store");
    world.store_path.set(path);
}

fn run_reconcile(world: &World, options: ReconcileOptions) {
    let path = store_path(world);
    let store = JsonFileStore::open(&path, FixedClock::shared()).expect("open store");
    let reconciler = Reconciler::new(Arc::new(store), Box::new(UserPartyKey), options);
    world.result.set(reconciler.run());
}

fn store_path(world: &World) -> Utf8PathBuf {
    world.store_path.get().expect("store path should be set")
}

fn load_store(world: &World) -> StoreSnapshot {
    let path = store_path(world);
    JsonFileStore::open(&path, FixedClock::shared())
        .expect("open store")
        .load()
        .expect("store loads")
}

fn backup_names(world: &World) -> Vec<String> {
    let naming = BackupNaming::for_store("data.json");
    list_store_dir(&store_path(world))
        .expect("list store dir")
        .into_iter()
        .filter(|name| naming.parse_millis(name).is_some())
        .collect()
}
