//! File watcher integration tests: coalescing modes, filters, dispatch
//! mapping and the health signal.

mod helpers;

use helpers::TestHarness;
use mydocs_server::config::WatcherConfig;
use mydocs_server::watch::FileWatcher;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn watcher_config(dir: PathBuf) -> WatcherConfig {
    WatcherConfig {
        watch_directories: vec![dir],
        debounce_delay_ms: 200,
        batch_delay_ms: 300,
        ..Default::default()
    }
}

fn build_watcher(h: &TestHarness, config: WatcherConfig) -> FileWatcher {
    FileWatcher::new(config, Arc::clone(&h.state.store), Arc::clone(&h.state.index_tool))
}

/// Poll until the store holds `expected` documents or the deadline passes.
async fn wait_for_documents(h: &TestHarness, expected: i64, deadline: Duration) -> i64 {
    let started = tokio::time::Instant::now();
    loop {
        let count = h.state.store.count_documents(None).await.unwrap();
        if count == expected || started.elapsed() > deadline {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Create (and canonicalize) the directory a test watches, so paths seen
/// through notify match the paths the test builds.
fn make_watch_dir(h: &TestHarness, name: &str) -> PathBuf {
    let dir = h.temp_dir.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir.canonicalize().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn debounced_rapid_events_dispatch_once() {
    let h = TestHarness::new().await;
    let watch_dir = make_watch_dir(&h, "watched");

    let mut watcher = build_watcher(&h, watcher_config(watch_dir.clone()));
    watcher.start().unwrap();

    // Five rapid writes to the same path inside the debounce window.
    let target = watch_dir.join("c.md");
    for i in 0..5 {
        std::fs::write(&target, format!("# Draft\n\nrevision {i}")).unwrap();
    }

    let count = wait_for_documents(&h, 1, Duration::from_secs(3)).await;
    assert_eq!(count, 1, "expected exactly one document row");

    // Quiet period: no further dispatches arrive for the same burst.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.state.store.count_documents(None).await.unwrap(), 1);

    let stats = watcher.stats();
    let dispatches = stats.total_events.load(Ordering::Relaxed);
    assert_eq!(dispatches, 1, "rapid events must coalesce to one dispatch");
    assert_eq!(stats.dispatch_errors.load(Ordering::Relaxed), 0);

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn batched_events_dispatch_each_path_once() {
    let h = TestHarness::new().await;
    let watch_dir = make_watch_dir(&h, "watched");

    let mut config = watcher_config(watch_dir.clone());
    config.batch_processing = true;
    let mut watcher = build_watcher(&h, config);
    watcher.start().unwrap();

    // Two paths, several events each, all inside one batch window.
    for i in 0..3 {
        std::fs::write(watch_dir.join("one.md"), format!("first {i}")).unwrap();
        std::fs::write(watch_dir.join("two.txt"), format!("second {i}")).unwrap();
    }

    let count = wait_for_documents(&h, 2, Duration::from_secs(3)).await;
    assert_eq!(count, 2, "each path lands exactly one document");

    tokio::time::sleep(Duration::from_millis(700)).await;
    let stats = watcher.stats();
    assert_eq!(stats.total_events.load(Ordering::Relaxed), 2);
    assert_eq!(stats.dispatch_errors.load(Ordering::Relaxed), 0);

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_file_is_removed_from_store() {
    let h = TestHarness::new().await;
    let watch_dir = make_watch_dir(&h, "watched");

    let mut watcher = build_watcher(&h, watcher_config(watch_dir.clone()));
    watcher.start().unwrap();

    let target = watch_dir.join("gone.md");
    std::fs::write(&target, "# Soon deleted").unwrap();
    assert_eq!(wait_for_documents(&h, 1, Duration::from_secs(3)).await, 1);

    std::fs::remove_file(&target).unwrap();
    assert_eq!(wait_for_documents(&h, 0, Duration::from_secs(3)).await, 0);

    let stats = watcher.stats();
    assert_eq!(stats.files_deleted.load(Ordering::Relaxed), 1);

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unwatched_extensions_and_ignored_dirs_are_filtered() {
    let h = TestHarness::new().await;
    let watch_dir = make_watch_dir(&h, "watched");
    std::fs::create_dir_all(watch_dir.join(".git")).unwrap();

    let mut watcher = build_watcher(&h, watcher_config(watch_dir.clone()));
    watcher.start().unwrap();

    std::fs::write(watch_dir.join("code.rs"), "fn main() {}").unwrap();
    std::fs::write(watch_dir.join(".git").join("notes.md"), "# VCS internal").unwrap();
    std::fs::write(watch_dir.join("real.md"), "# Counted").unwrap();

    assert_eq!(wait_for_documents(&h, 1, Duration::from_secs(3)).await, 1);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.state.store.count_documents(None).await.unwrap(), 1);

    let doc = h
        .state
        .store
        .get_by_path(&watch_dir.join("real.md").to_string_lossy())
        .await
        .unwrap();
    assert!(doc.is_some());

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_skips_invalid_directories_and_health_reflects_state() {
    let h = TestHarness::new().await;
    let good = make_watch_dir(&h, "good");
    let missing = h.temp_dir.path().join("missing");

    let mut config = watcher_config(good);
    config.watch_directories.push(missing);
    let mut watcher = build_watcher(&h, config);

    // Not yet started: unhealthy.
    let health = watcher.health();
    assert!(!health.healthy);

    // One of two directories is valid; start still succeeds.
    let active = watcher.start().unwrap();
    assert_eq!(active, 1);

    let health = watcher.health();
    assert!(health.healthy, "issues: {:?}", health.issues);
    assert_eq!(health.error_rate, 0.0);

    watcher.stop().await;
    assert!(!watcher.health().healthy);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_fails_with_no_valid_directories() {
    let h = TestHarness::new().await;
    let mut watcher =
        build_watcher(&h, watcher_config(h.temp_dir.path().join("does-not-exist")));
    assert!(watcher.start().is_err());
}
