use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;

type Seen = Arc<Mutex<Vec<(String, Option<Value>, Option<Value>)>>>;

fn recorder(store: &SharedStore, key: &str) -> (Seen, Subscription) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let sub = store.subscribe(key, move |k, old, new| {
        sink.lock().push((k.to_string(), old.cloned(), new.cloned()));
    });
    (seen, sub)
}

#[test]
fn test_set_notifies_writer_with_old_and_new() {
    let store = SharedStore::in_memory();
    let (seen, _sub) = recorder(&store, "k");

    store.set("k", json!(1)).unwrap();
    store.set("k", json!(2)).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("k".into(), None, Some(json!(1))));
    assert_eq!(seen[1], ("k".into(), Some(json!(1)), Some(json!(2))));
}

#[test]
fn test_every_tab_handle_is_notified() {
    let tab_a = SharedStore::in_memory();
    let tab_b = tab_a.clone();
    let (seen_a, _a) = recorder(&tab_a, "k");
    let (seen_b, _b) = recorder(&tab_b, "k");

    tab_b.set("k", json!("v")).unwrap();

    assert_eq!(seen_a.lock().len(), 1);
    assert_eq!(seen_b.lock().len(), 1);
    assert_eq!(tab_a.get("k"), Some(json!("v")));
}

#[test]
fn test_listeners_fire_in_subscription_order() {
    let store = SharedStore::in_memory();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let order = Arc::clone(&order);
        store.subscribe("k", move |_, _, _| order.lock().push(i));
    }

    store.set("k", json!(true)).unwrap();
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn test_only_matching_key_fires() {
    let store = SharedStore::in_memory();
    let (seen, _sub) = recorder(&store, "a");
    store.set("b", json!(1)).unwrap();
    assert!(seen.lock().is_empty());
}

#[test]
fn test_null_reads_as_absent() {
    let store = SharedStore::in_memory();
    let (seen, _sub) = recorder(&store, "k");
    store.set("k", json!({"x": 1})).unwrap();
    store.set("k", Value::Null).unwrap();

    assert_eq!(store.get("k"), None);
    assert_eq!(store.get_or("k", json!("default")), json!("default"));
    assert_eq!(seen.lock()[1].2, None);
}

#[test]
fn test_get_as_ignores_undecodable() {
    let store = SharedStore::in_memory();
    store.set("n", json!("not a number")).unwrap();
    assert_eq!(store.get_as::<u64>("n"), None);
    store.set("n", json!(7)).unwrap();
    assert_eq!(store.get_as::<u64>("n"), Some(7));
}

#[test]
fn test_delete_notifies_with_none() {
    let store = SharedStore::in_memory();
    store.set("k", json!(1)).unwrap();
    let (seen, _sub) = recorder(&store, "k");

    store.delete("k").unwrap();
    store.delete("k").unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, Some(json!(1)));
    assert_eq!(seen[0].2, None);
}

#[test]
fn test_detach_stops_notifications() {
    let store = SharedStore::in_memory();
    let (seen, sub) = recorder(&store, "k");
    store.set("k", json!(1)).unwrap();

    assert!(store.unsubscribe(sub));
    store.set("k", json!(2)).unwrap();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_listener_may_write_reentrantly() {
    let store = SharedStore::in_memory();
    let echo = store.clone();
    store.subscribe("ping", move |_, _, new| {
        if let Some(v) = new {
            echo.set("pong", v.clone()).unwrap();
        }
    });

    store.set("ping", json!(42)).unwrap();
    assert_eq!(store.get("pong"), Some(json!(42)));
}

#[test]
fn test_file_store_persists_and_refreshes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state/state.json");

    let writer = SharedStore::open(&path).unwrap();
    let reader = SharedStore::open(&path).unwrap();
    let (seen, _sub) = recorder(&reader, "dev_mode.local");

    writer.set("dev_mode.local", json!({"hostId": "h1"})).unwrap();
    assert!(path.exists());

    // Nothing fires in the other process until it refreshes
    assert!(seen.lock().is_empty());
    assert_eq!(reader.refresh().unwrap(), 1);
    assert_eq!(reader.refresh().unwrap(), 0);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(reader.get("dev_mode.local"), Some(json!({"hostId": "h1"})));

    writer.delete("dev_mode.local").unwrap();
    assert_eq!(reader.refresh().unwrap(), 1);
    assert_eq!(seen.lock()[1].2, None);
}

#[test]
fn test_write_keeps_other_process_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let a = SharedStore::open(&path).unwrap();
    let b = SharedStore::open(&path).unwrap();
    let (seen, _sub) = recorder(&b, "dev_mode.local");

    a.set("dev_mode.local", json!({"hostId": "a"})).unwrap();
    // `b` never refreshed, yet its write must not drop `a`'s key
    b.set("bundle.updated_at", json!({"updatedAt": 1, "hash": "x"}))
        .unwrap();
    assert_eq!(seen.lock().len(), 1);

    let fresh = SharedStore::open(&path).unwrap();
    assert_eq!(fresh.get("dev_mode.local"), Some(json!({"hostId": "a"})));
    assert!(fresh.get("bundle.updated_at").is_some());
}

#[test]
fn test_file_store_reopen_reads_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    SharedStore::open(&path)
        .unwrap()
        .set("k", json!("kept"))
        .unwrap();

    let reopened = SharedStore::open(&path).unwrap();
    assert_eq!(reopened.get("k"), Some(json!("kept")));
    assert_eq!(reopened.path(), Some(path));
}

#[test]
fn test_corrupt_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        SharedStore::open(&path),
        Err(StoreError::Corrupt(..))
    ));
}

#[test]
fn test_in_memory_refresh_is_noop() {
    let store = SharedStore::in_memory();
    store.set("k", json!(1)).unwrap();
    assert_eq!(store.refresh().unwrap(), 0);
}

#[test]
fn test_corrupt_refresh_keeps_view_and_write_heals() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let store = SharedStore::open(&path).unwrap();
    store.set("k", json!(1)).unwrap();

    std::fs::write(&path, "{ truncated").unwrap();
    assert!(store.refresh().is_err());
    assert_eq!(store.get("k"), Some(json!(1)));

    store.set("k", json!(2)).unwrap();
    let reopened = SharedStore::open(&path).unwrap();
    assert_eq!(reopened.get("k"), Some(json!(2)));
}

#[test]
fn test_failed_write_still_delivers_merged_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let other = SharedStore::open(&path).unwrap();
    let store = SharedStore::open(&path).unwrap();
    let (seen, _sub) = recorder(&store, "dev_mode.local");
    other.set("dev_mode.local", json!({"hostId": "other"})).unwrap();

    // Occupy the temp file name so the next write cannot land
    let blocker = dir
        .path()
        .join(format!(".state.json.{}.tmp", std::process::id()));
    std::fs::create_dir(&blocker).unwrap();

    assert!(matches!(
        store.set("bundle.updated_at", json!(1)),
        Err(StoreError::Io(..))
    ));
    assert!(store.delete("dev_mode.local").is_err());
    assert_eq!(store.get("bundle.updated_at"), None);
    assert_eq!(store.get("dev_mode.local"), Some(json!({"hostId": "other"})));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].2, Some(json!({"hostId": "other"})));
}
