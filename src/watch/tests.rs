use std::fs;
use std::time::{Duration, UNIX_EPOCH};

use tempfile::TempDir;

use super::*;
use crate::compiler::ConcatCompiler;
use crate::store::SharedStore;

const START: u64 = 1_000_000;

fn write_at(dir: &Path, name: &str, content: &str, mtime_ms: u64) {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_millis(mtime_ms))
        .unwrap();
}

fn start(dir: &TempDir, store: &SharedStore, host: &str) -> LocalWatcher {
    let (watcher, _) = LocalWatcher::start(
        dir.path(),
        vec!["ts".into()],
        TabId::new(host),
        ModeArbiter::new(store.clone()),
        Arc::new(ConcatCompiler),
        START,
    )
    .unwrap();
    watcher
}

fn local_record(store: &SharedStore) -> Option<DevModeRecord> {
    store.get_as(ModeKind::Local.key())
}

#[test]
fn test_publishes_then_republishes_newer() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "1", START + 10);
    let mut watcher = start(&dir, &store, "h");

    let Ok(PollOutcome::Published { last_modified: t1, .. }) = watcher.poll(START + 20) else {
        panic!("first poll should publish");
    };
    let record = local_record(&store).unwrap();
    assert_eq!(record.last_modified, t1);
    assert_eq!(record.files.get("a.ts").map(String::as_str), Some("1"));
    assert_eq!(record.compiled_content, "// a.ts\n1\n");

    write_at(dir.path(), "a.ts", "2", START + 50);
    let Ok(PollOutcome::Published { last_modified: t2, .. }) = watcher.poll(START + 60) else {
        panic!("second poll should publish");
    };
    assert!(t2 > t1);
    assert_eq!(local_record(&store).unwrap().compiled_content, "// a.ts\n2\n");
}

#[test]
fn test_unchanged_poll_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "1", START + 10);
    let mut watcher = start(&dir, &store, "h");
    watcher.poll(START + 20).unwrap();

    let writes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&writes);
    store.subscribe(ModeKind::Local.key(), move |_, _, _| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    assert!(matches!(watcher.poll(START + 30).unwrap(), PollOutcome::Unchanged));
    assert_eq!(writes.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_timestamp_never_below_placeholder() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    // Sources older than the session start
    write_at(dir.path(), "a.ts", "1", 5);
    let mut watcher = start(&dir, &store, "h");

    let PollOutcome::Published { last_modified, .. } = watcher.poll(START + 1).unwrap() else {
        panic!("expected publish");
    };
    assert!(last_modified > START);
}

#[test]
fn test_compile_failure_publishes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "1", START + 10);
    let mut watcher = start(&dir, &store, "h");
    watcher.poll(START + 20).unwrap();
    let before = store.get(ModeKind::Local.key());

    write_at(dir.path(), "a.ts", "/* broken", START + 30);
    let outcome = watcher.poll(START + 40).unwrap();
    assert!(matches!(outcome, PollOutcome::CompileFailed(CompileError::Syntax { .. })));
    assert_eq!(store.get(ModeKind::Local.key()), before);

    // Broken set is not recompiled until it changes
    assert!(matches!(watcher.poll(START + 45).unwrap(), PollOutcome::Unchanged));

    write_at(dir.path(), "a.ts", "/* fixed */", START + 50);
    assert!(matches!(
        watcher.poll(START + 60).unwrap(),
        PollOutcome::Published { .. }
    ));
    assert_eq!(
        local_record(&store).unwrap().compiled_content,
        "// a.ts\n/* fixed */\n"
    );
}

#[test]
fn test_first_poll_failure_keeps_placeholder() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "/*", START + 10);
    let mut watcher = start(&dir, &store, "h");

    assert!(matches!(
        watcher.poll(START + 20).unwrap(),
        PollOutcome::CompileFailed(_)
    ));
    let record = local_record(&store).unwrap();
    assert!(!record.has_content());
    assert_eq!(record.last_modified, START);
}

#[test]
fn test_removed_file_republishes() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "1", START + 10);
    write_at(dir.path(), "b.ts", "2", START + 10);
    let mut watcher = start(&dir, &store, "h");
    watcher.poll(START + 20).unwrap();

    fs::remove_file(dir.path().join("b.ts")).unwrap();
    let PollOutcome::Published { last_modified, changed } = watcher.poll(START + 100).unwrap()
    else {
        panic!("expected publish");
    };
    assert_eq!(changed, 1);
    assert_eq!(last_modified, START + 100);
    assert!(!local_record(&store).unwrap().files.contains_key("b.ts"));
}

#[test]
fn test_superseded_host_stops_silently() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    write_at(dir.path(), "a.ts", "1", START + 10);
    let mut first = start(&dir, &store, "first");
    let mut second = start(&dir, &store, "second");

    assert!(matches!(first.poll(START + 20).unwrap(), PollOutcome::Superseded));
    assert!(!first.is_active());
    assert!(matches!(second.poll(START + 20).unwrap(), PollOutcome::Published { .. }));

    // A stale host stopping must not clear the new session
    assert!(!first.stop().unwrap());
    drop(first);
    assert_eq!(local_record(&store).unwrap().host_id, TabId::new("second"));
}

#[test]
fn test_stop_and_drop_clear_record() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    let mut watcher = start(&dir, &store, "h");
    assert!(watcher.stop().unwrap());
    assert!(local_record(&store).is_none());

    let watcher = start(&dir, &store, "h");
    assert!(local_record(&store).is_some());
    drop(watcher);
    assert!(local_record(&store).is_none());
}

#[test]
fn test_unavailable_directory_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    let result = LocalWatcher::start(
        &dir.path().join("missing"),
        vec!["ts".into()],
        TabId::new("h"),
        ModeArbiter::new(store.clone()),
        Arc::new(ConcatCompiler),
        START,
    );
    assert!(matches!(result, Err(WatchError::Unavailable(..))));
    assert!(local_record(&store).is_none());
}

#[test]
fn test_conflict_with_editor_mode() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::in_memory();
    let arbiter = ModeArbiter::new(store.clone());
    arbiter
        .try_start(ModeKind::Editor, &TabId::new("editor"), START)
        .unwrap();

    let result = LocalWatcher::start(
        dir.path(),
        vec!["ts".into()],
        TabId::new("h"),
        arbiter,
        Arc::new(ConcatCompiler),
        START,
    );
    assert!(matches!(
        result,
        Err(WatchError::Rejected(Rejection::Conflict { .. }))
    ));
    assert!(local_record(&store).is_none());
}
