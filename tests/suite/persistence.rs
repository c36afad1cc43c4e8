//! Sessions stored on disk across process restarts.

use std::sync::Arc;

use wicket_core::RouteGuard;
use wicket_store::{FileTier, MemoryTier, SessionStore};
use wicket_types::{DEMO_SESSION_TOKEN, EntitlementTier, StorageTier, classify_session};

use crate::common::{demo_session, paid_session};

/// A store as the binary builds it: fresh memory tier, file-backed persistent tier.
fn open_store(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::new(
        Arc::new(MemoryTier::new()),
        Arc::new(FileTier::open(dir.path().join("session.json"))),
    )
}

#[test]
fn remembered_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    open_store(&dir)
        .write(&paid_session("jwt-1"), StorageTier::Persistent)
        .unwrap();

    let restarted = open_store(&dir);
    let active = restarted.read().unwrap().unwrap();
    assert_eq!(active.tier, StorageTier::Persistent);
    assert_eq!(active.session, paid_session("jwt-1"));
    assert!(RouteGuard::new(restarted).is_admitted());
}

#[test]
fn ephemeral_session_ends_with_process() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .write(&demo_session(), StorageTier::Ephemeral)
        .unwrap();
    assert!(RouteGuard::new(store).is_admitted());

    let restarted = open_store(&dir);
    assert!(restarted.read().unwrap().is_none());
    assert!(!RouteGuard::new(restarted).is_admitted());
}

#[test]
fn switching_to_ephemeral_removes_the_file_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .write(&paid_session("old"), StorageTier::Persistent)
        .unwrap();
    store
        .write(&demo_session(), StorageTier::Ephemeral)
        .unwrap();

    let active = store.read().unwrap().unwrap();
    assert_eq!(active.tier, StorageTier::Ephemeral);
    assert_eq!(
        classify_session(&active.session, DEMO_SESSION_TOKEN),
        EntitlementTier::Demo
    );
    assert!(open_store(&dir).read().unwrap().is_none());
}

#[test]
fn lapsed_subscription_on_disk_is_still_admitted() {
    let dir = tempfile::tempdir().unwrap();
    let mut lapsed = paid_session("jwt-2");
    lapsed.subscription = "expired".into();
    open_store(&dir)
        .write(&lapsed, StorageTier::Persistent)
        .unwrap();

    let restarted = open_store(&dir);
    let active = restarted.read().unwrap().unwrap();
    assert_eq!(
        classify_session(&active.session, DEMO_SESSION_TOKEN),
        EntitlementTier::Denied
    );
    assert!(RouteGuard::new(restarted).is_admitted());
}

#[test]
fn corrupt_session_file_reads_as_logged_out() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("session.json"), "{not json").unwrap();

    let store = open_store(&dir);
    assert!(store.read().unwrap().is_none());
    assert!(!RouteGuard::new(store.clone()).is_admitted());

    store
        .write(&paid_session("fresh"), StorageTier::Persistent)
        .unwrap();
    assert!(open_store(&dir).read().unwrap().is_some());
}

#[test]
fn clear_empties_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .write(&paid_session("jwt-3"), StorageTier::Persistent)
        .unwrap();
    store.clear().unwrap();

    assert!(open_store(&dir).read().unwrap().is_none());
}
