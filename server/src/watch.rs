//! File watcher for incremental live re-indexing.
//!
//! Watches the configured directories and drives ingest, reindex, removal
//! and rename actions against the store as files change. The notify
//! callback thread only forwards events over a channel; all coalescing
//! state (pending events, timers) lives in a single drain task, so it needs
//! no external synchronization.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::db::DocumentStore;
use crate::tools::index_document::IndexDocumentTool;
use crate::tools::Tool;

/// Ceiling on draining in-flight dispatches at shutdown.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    pub ts: Instant,
}

/// Dispatch counters, shared with the health endpoint.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub files_indexed: AtomicU64,
    pub files_updated: AtomicU64,
    pub files_deleted: AtomicU64,
    pub files_moved: AtomicU64,
    pub dispatch_errors: AtomicU64,
    pub total_events: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct WatcherHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub error_rate: f64,
}

pub struct FileWatcher {
    config: WatcherConfig,
    store: Arc<DocumentStore>,
    index_tool: Arc<IndexDocumentTool>,
    stats: Arc<WatcherStats>,
    running: Arc<AtomicBool>,
    active_dirs: Vec<PathBuf>,
    // Dropping the watcher releases the OS handles.
    watcher: Option<RecommendedWatcher>,
    drain_task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl FileWatcher {
    pub fn new(
        config: WatcherConfig,
        store: Arc<DocumentStore>,
        index_tool: Arc<IndexDocumentTool>,
    ) -> Self {
        Self {
            config,
            store,
            index_tool,
            stats: Arc::new(WatcherStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            active_dirs: Vec::new(),
            watcher: None,
            drain_task: None,
            shutdown_tx: None,
        }
    }

    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Validate directories and begin watching. Succeeds when at least one
    /// directory watch is active.
    pub fn start(&mut self) -> Result<usize, String> {
        if self.running.load(Ordering::SeqCst) {
            warn!("File watcher is already running");
            return Ok(self.active_dirs.len());
        }
        if self.config.watch_directories.is_empty() {
            return Err("No watch directories configured".to_string());
        }

        let (tx, rx) = mpsc::unbounded_channel::<WatchEvent>();
        let mut watcher = build_notify_watcher(tx)?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let mut active = Vec::new();
        for dir in &self.config.watch_directories {
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Skipping invalid watch directory");
                continue;
            }
            match watcher.watch(dir, mode) {
                Ok(()) => {
                    info!(dir = %dir.display(), recursive = self.config.recursive, "Watching directory");
                    active.push(dir.clone());
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to watch directory"),
            }
        }
        if active.is_empty() {
            return Err("Failed to set up any directory watches".to_string());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drain = DrainTask {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            index_tool: Arc::clone(&self.index_tool),
            stats: Arc::clone(&self.stats),
            ignore: build_ignore_set(&self.config.ignore_patterns),
        };
        self.drain_task = Some(tokio::spawn(drain.run(rx, shutdown_rx)));

        self.watcher = Some(watcher);
        self.shutdown_tx = Some(shutdown_tx);
        self.active_dirs = active;
        self.running.store(true, Ordering::SeqCst);
        info!(directories = self.active_dirs.len(), "File watcher started");
        Ok(self.active_dirs.len())
    }

    /// Flush pending coalescers, drain in-flight dispatches and release the
    /// OS watch handles.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.drain_task.take() {
            if tokio::time::timeout(STOP_DRAIN_TIMEOUT, task).await.is_err() {
                warn!("Watcher drain did not finish within the stop ceiling");
            }
        }
        self.watcher = None;

        let stats = &self.stats;
        info!(
            indexed = stats.files_indexed.load(Ordering::Relaxed),
            updated = stats.files_updated.load(Ordering::Relaxed),
            deleted = stats.files_deleted.load(Ordering::Relaxed),
            moved = stats.files_moved.load(Ordering::Relaxed),
            errors = stats.dispatch_errors.load(Ordering::Relaxed),
            "File watcher stopped"
        );
    }

    /// Configuration summary, logged once at startup.
    pub fn summary(&self) -> serde_json::Value {
        let mut extensions: Vec<&str> =
            self.config.watched_extensions.iter().map(String::as_str).collect();
        extensions.sort_unstable();
        serde_json::json!({
            "directories_count": self.active_dirs.len(),
            "directories": self.active_dirs.iter().map(|d| d.display().to_string()).collect::<Vec<_>>(),
            "watched_extensions": extensions,
            "recursive_watch": self.config.recursive,
            "mode": if self.config.batch_processing { "batched" } else { "debounced" },
            "debounce_delay_ms": self.config.debounce_delay_ms,
            "batch_delay_ms": self.config.batch_delay_ms,
            "max_file_size_mb": self.config.max_file_size_mb,
            "ignore_patterns_count": self.config.ignore_patterns.len(),
        })
    }

    /// `healthy = running && error_rate < 0.1 && all_dirs_exist`.
    pub fn health(&self) -> WatcherHealth {
        let mut issues = Vec::new();
        let running = self.running.load(Ordering::SeqCst);
        if !running {
            issues.push("watcher is not running".to_string());
        }
        for dir in &self.active_dirs {
            if !dir.is_dir() {
                issues.push(format!("watch directory missing: {}", dir.display()));
            }
        }
        let total = self.stats.total_events.load(Ordering::Relaxed);
        let errors = self.stats.dispatch_errors.load(Ordering::Relaxed);
        let error_rate = if total == 0 { 0.0 } else { errors as f64 / total as f64 };
        if error_rate >= 0.1 {
            issues.push(format!("dispatch error rate {error_rate:.2}"));
        }
        WatcherHealth { healthy: issues.is_empty(), issues, error_rate }
    }
}

fn build_notify_watcher(
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> Result<RecommendedWatcher, String> {
    RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else { return };
            let now = Instant::now();
            match classify(&event.kind) {
                Some(WatchEventKind::Moved) if event.paths.len() == 2 => {
                    let _ = tx.send(WatchEvent {
                        kind: WatchEventKind::Moved,
                        path: event.paths[1].clone(),
                        old_path: Some(event.paths[0].clone()),
                        ts: now,
                    });
                }
                Some(kind) => {
                    for path in event.paths {
                        let _ = tx.send(WatchEvent { kind, path, old_path: None, ts: now });
                    }
                }
                None => {}
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| format!("Failed to create file watcher: {e}"))
}

fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    use notify::event::{ModifyKind, RenameMode};
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Some(WatchEventKind::Moved),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchEventKind::Created),
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Remove(_) => Some(WatchEventKind::Deleted),
        _ => None,
    }
}

fn build_ignore_set(patterns: &[String]) -> globset::GlobSet {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        match globset::Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(_) => warn!(pattern = pattern.as_str(), "Invalid ignore pattern"),
        }
    }
    builder.build().unwrap_or_else(|_| globset::GlobSet::empty())
}

// ---------------------------------------------------------------------------
// Drain task: intake filtering, coalescing, dispatch
// ---------------------------------------------------------------------------

struct DrainTask {
    config: WatcherConfig,
    store: Arc<DocumentStore>,
    index_tool: Arc<IndexDocumentTool>,
    stats: Arc<WatcherStats>,
    ignore: globset::GlobSet,
}

impl DrainTask {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // pending[path] -> (latest event, its coalescing deadline)
        let mut pending: HashMap<PathBuf, (WatchEvent, Instant)> = HashMap::new();
        // Batched mode arms one timer on the first event of a window.
        let mut batch_deadline: Option<Instant> = None;

        loop {
            let next_deadline = if self.config.batch_processing {
                batch_deadline
            } else {
                pending.values().map(|(_, deadline)| *deadline).min()
            };
            let sleep_until =
                next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if !self.admits(&event) {
                        continue;
                    }
                    let deadline = if self.config.batch_processing {
                        *batch_deadline.get_or_insert_with(|| {
                            Instant::now() + Duration::from_millis(self.config.batch_delay_ms)
                        })
                    } else {
                        // A new event for the same path replaces the prior
                        // timer as well as the prior event.
                        Instant::now() + Duration::from_millis(self.config.debounce_delay_ms)
                    };
                    pending.insert(event.path.clone(), (event, deadline));
                }
                _ = tokio::time::sleep_until(sleep_until), if next_deadline.is_some() => {
                    if self.config.batch_processing {
                        batch_deadline = None;
                        let drained: Vec<WatchEvent> =
                            pending.drain().map(|(_, (event, _))| event).collect();
                        debug!(batch = drained.len(), "Dispatching batched events");
                        for event in drained {
                            self.dispatch(event).await;
                        }
                    } else {
                        let now = Instant::now();
                        let ready: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, (_, deadline))| *deadline <= now)
                            .map(|(path, _)| path.clone())
                            .collect();
                        for path in ready {
                            if let Some((event, _)) = pending.remove(&path) {
                                self.dispatch(event).await;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    // Flush everything still pending, then exit.
                    let drained: Vec<WatchEvent> =
                        pending.drain().map(|(_, (event, _))| event).collect();
                    for event in drained {
                        self.dispatch(event).await;
                    }
                    break;
                }
            }
        }
    }

    /// Intake filter: regular files, whitelisted extensions, size cap and
    /// ignore patterns. Deletions can only be filtered by path.
    fn admits(&self, event: &WatchEvent) -> bool {
        if self.is_ignored(&event.path) {
            return false;
        }
        if !self.config.watches_extension(&event.path) {
            return false;
        }
        if event.kind == WatchEventKind::Deleted {
            return true;
        }
        let Ok(meta) = std::fs::metadata(&event.path) else {
            // The file may be gone again already; a move target is still
            // worth dispatching so the store can follow the rename.
            return event.kind == WatchEventKind::Moved;
        };
        if !meta.is_file() {
            return false;
        }
        meta.len() <= self.config.max_file_size_mb * 1024 * 1024
    }

    fn is_ignored(&self, path: &Path) -> bool {
        path.components()
            .any(|component| self.ignore.is_match(Path::new(component.as_os_str())))
    }

    async fn dispatch(&self, event: WatchEvent) {
        self.stats.total_events.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = %event.path.display(),
            kind = ?event.kind,
            coalesced_ms = event.ts.elapsed().as_millis() as u64,
            "Dispatching event"
        );
        let outcome = match event.kind {
            WatchEventKind::Created => self.ingest(&event.path, false).await,
            WatchEventKind::Modified => {
                let known = matches!(
                    self.store.get_by_path(&event.path.to_string_lossy()).await,
                    Ok(Some(_))
                );
                self.ingest(&event.path, known).await
            }
            WatchEventKind::Deleted => self.remove(&event.path).await,
            WatchEventKind::Moved => self.rename(&event).await,
        };
        if let Err(message) = outcome {
            self.stats.dispatch_errors.fetch_add(1, Ordering::Relaxed);
            warn!(path = %event.path.display(), error = message.as_str(), "Watcher dispatch failed");
        }
    }

    async fn ingest(&self, path: &Path, force: bool) -> Result<(), String> {
        let mut params = serde_json::Map::new();
        params.insert(
            "file_path".to_string(),
            serde_json::Value::String(path.to_string_lossy().into_owned()),
        );
        params.insert("force_reindex".to_string(), serde_json::Value::Bool(force));

        match self.index_tool.execute(params).await {
            Ok(output) => {
                let status = output.data.get("status").and_then(|s| s.as_str()).unwrap_or("");
                match status {
                    "reindexed" => {
                        self.stats.files_updated.fetch_add(1, Ordering::Relaxed);
                    }
                    "already_indexed" => {}
                    _ => {
                        self.stats.files_indexed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                debug!(path = %path.display(), status, "Watcher ingest");
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn remove(&self, path: &Path) -> Result<(), String> {
        match self.store.delete_by_path(&path.to_string_lossy()).await {
            Ok(true) => {
                self.stats.files_deleted.fetch_add(1, Ordering::Relaxed);
                info!(path = %path.display(), "Removed deleted file from store");
                Ok(())
            }
            Ok(false) => {
                debug!(path = %path.display(), "Deleted file was not in store");
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Known old path: rewrite the path column and reindex to refresh the
    /// derived fields. Unknown old path: plain ingest of the new one.
    async fn rename(&self, event: &WatchEvent) -> Result<(), String> {
        let new_path = event.path.to_string_lossy().into_owned();
        if let Some(old) = &event.old_path {
            let old_path = old.to_string_lossy().into_owned();
            match self.store.rename_path(&old_path, &new_path).await {
                Ok(true) => {
                    self.ingest(&event.path, true).await?;
                    self.stats.files_moved.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
        self.ingest(&event.path, false).await
    }
}
