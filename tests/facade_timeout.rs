use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use hivewatch::store::{BlockingStore, InMemoryStore};
use hivewatch::{HiveError, StoreError};

fn facade(timeout: Duration) -> (Arc<InMemoryStore>, BlockingStore) {
    let store = Arc::new(InMemoryStore::new());
    store
        .seed("hives", "H1", json!({ "name": "Orchard" }))
        .unwrap();
    let facade = BlockingStore::new(store.clone(), timeout);
    (store, facade)
}

#[test]
fn stalled_get_times_out_within_bound() {
    let (store, facade) = facade(Duration::from_millis(200));
    store.stall_path("hives");

    let started = Instant::now();
    let err = facade.get("hives/H1").unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        HiveError::Store(StoreError::Timeout { duration_ms: 200, .. })
    ));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[test]
fn stall_is_scoped_to_its_prefix() {
    let (store, facade) = facade(Duration::from_millis(200));
    store.stall_path("users");

    let doc = facade.get("hives/H1").unwrap().unwrap();
    assert_eq!(doc.id, "H1");
    assert!(facade.get("users/u1").unwrap_err().is_timeout());
}

#[test]
fn stalled_writes_time_out_too() {
    let (store, facade) = facade(Duration::from_millis(100));
    store.stall_path("readings");

    assert!(facade.add("readings", json!({ "hiveId": "H1" })).unwrap_err().is_timeout());
    assert!(facade.set("readings", "r1", json!({})).unwrap_err().is_timeout());
}

#[test]
fn denied_path_is_a_remote_error() {
    let (store, facade) = facade(Duration::from_secs(2));
    store.deny_path("hives");

    let err = facade.get("hives/H1").unwrap_err();
    assert!(!err.is_timeout());
    assert!(matches!(
        err,
        HiveError::Store(StoreError::Remote { ref code, .. }) if code == "permission-denied"
    ));

    store.clear_faults();
    assert!(facade.get("hives/H1").unwrap().is_some());
}

#[test]
fn invalid_paths_fail_before_reaching_the_store() {
    let (_store, facade) = facade(Duration::from_secs(2));
    assert!(facade.get("").unwrap_err().is_validation());
    assert!(facade.get("hives").unwrap_err().is_validation());
}
