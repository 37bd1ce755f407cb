//! Connection pool for the embedded SQLite store.
//!
//! Each unique database file gets one long-lived connection, created lazily
//! and registered by path. Callers hand the pool a closure; it runs on the
//! tokio blocking pool with the per-file connection locked, so writes to one
//! file serialize while callers against different files proceed. A semaphore
//! bounds concurrent callers overall.

use dashmap::DashMap;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Queries running longer than this are logged as slow but not cancelled.
pub const SLOW_QUERY_MS: u128 = 200;

type Handle = Arc<Mutex<Connection>>;

pub struct ConnectionPool {
    handles: DashMap<PathBuf, Handle>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    /// `max_connections` bounds concurrent callers across all files.
    pub fn new(max_connections: usize) -> Self {
        Self { handles: DashMap::new(), permits: Arc::new(Semaphore::new(max_connections.max(1))) }
    }

    /// Open a connection with the store's tuning pragmas applied.
    fn open(db_path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(db_path).map_err(|e| {
            StoreError::Connection(format!("open {}: {e}", db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Connection(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StoreError::Connection(format!("set synchronous NORMAL: {e}")))?;
        // Negative cache_size means KiB: 64 MB shared reader cache.
        conn.pragma_update(None, "cache_size", -64000)
            .map_err(|e| StoreError::Connection(format!("set cache_size: {e}")))?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(|e| StoreError::Connection(format!("set temp_store MEMORY: {e}")))?;
        conn.pragma_update(None, "mmap_size", 268_435_456i64)
            .map_err(|e| StoreError::Connection(format!("set mmap_size: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::Connection(format!("set foreign_keys ON: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| StoreError::Connection(format!("set busy_timeout: {e}")))?;
        Ok(conn)
    }

    /// Get or lazily create the pooled handle for `db_path`.
    fn handle(&self, db_path: &Path) -> Result<Handle, StoreError> {
        if let Some(handle) = self.handles.get(db_path) {
            return Ok(Arc::clone(&handle));
        }
        let conn = Self::open(db_path)?;
        debug!(db = %db_path.display(), "Opened pooled connection");
        let handle: Handle = Arc::new(Mutex::new(conn));
        let entry = self.handles.entry(db_path.to_path_buf()).or_insert(handle);
        Ok(Arc::clone(&entry))
    }

    /// Run `f` against the pooled connection for `db_path` on the blocking
    /// pool. Slow calls (> 200 ms) log a warning but still succeed.
    pub async fn run<T, F>(&self, db_path: &Path, label: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Connection("connection pool closed".to_string()))?;
        let handle = self.handle(db_path)?;

        let (out, elapsed) = tokio::task::spawn_blocking(move || match handle.lock() {
            Ok(mut conn) => {
                let start = Instant::now();
                let out = f(&mut conn);
                (out, start.elapsed())
            }
            Err(_) => (
                Err(StoreError::Connection("poisoned connection handle".to_string())),
                Duration::ZERO,
            ),
        })
        .await
        .map_err(|e| StoreError::Connection(format!("blocking task failed: {e}")))?;
        if elapsed > Duration::from_millis(SLOW_QUERY_MS as u64) {
            warn!(query = label, elapsed_ms = elapsed.as_millis() as u64, "Slow query");
        }
        out
    }

    /// Close all pooled handles. Runs `PRAGMA optimize` on each before drop.
    pub fn close(&self) {
        for entry in self.handles.iter() {
            if let Ok(conn) = entry.value().lock() {
                let _ = conn.execute_batch("PRAGMA optimize;");
            }
        }
        self.handles.clear();
    }

    #[cfg(test)]
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_reuses_one_handle_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("pool.db");
        let pool = ConnectionPool::new(4);

        pool.run(&db, "create", |conn| {
            conn.execute_batch("CREATE TABLE t (x INTEGER)").map_err(StoreError::from)
        })
        .await
        .unwrap();
        pool.run(&db, "insert", |conn| {
            conn.execute("INSERT INTO t (x) VALUES (1)", []).map_err(StoreError::from)?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(pool.open_handles(), 1);

        let count: i64 = pool
            .run(&db, "count", |conn| {
                conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn connection_error_on_unreachable_path() {
        let pool = ConnectionPool::new(2);
        let result = pool
            .run(Path::new("/nonexistent-dir/zzz/db.sqlite"), "open", |_| Ok(()))
            .await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn concurrent_callers_share_the_serialized_handle() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("pool.db");
        let pool = Arc::new(ConnectionPool::new(10));

        pool.run(&db, "create", |conn| {
            conn.execute_batch("CREATE TABLE t (x INTEGER)").map_err(StoreError::from)
        })
        .await
        .unwrap();

        let mut tasks = Vec::new();
        for i in 0..16i64 {
            let pool = Arc::clone(&pool);
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                pool.run(&db, "insert", move |conn| {
                    conn.execute("INSERT INTO t (x) VALUES (?1)", [i])
                        .map_err(StoreError::from)?;
                    Ok(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let count: i64 = pool
            .run(&db, "count", |conn| {
                conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 16);
    }
}
