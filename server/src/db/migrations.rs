//! Schema sequencer: versioned migrations over the SQLite store.
//!
//! The persistent schema version lives in the `user_version` pragma and is
//! mutated only here. Each migration runs inside one transaction and is
//! recorded in the `schema_migrations` log table; a failure rolls the
//! offending migration back and aborts startup.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

const CREATE_DOCUMENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    content TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    file_hash TEXT NOT NULL,
    created_at TEXT,
    modified_at TEXT,
    indexed_at TEXT DEFAULT CURRENT_TIMESTAMP,
    metadata_json TEXT DEFAULT '{}',

    CHECK (file_size >= 0),
    CHECK (LENGTH(file_hash) = 64)
);
";

const CREATE_DOCUMENT_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS document_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    extracted_at TEXT DEFAULT CURRENT_TIMESTAMP,

    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    UNIQUE (document_id, key)
);
";

const CREATE_SEARCH_INDEX_TABLE: &str = "
CREATE TABLE IF NOT EXISTS search_index (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    keyword TEXT NOT NULL,
    frequency INTEGER NOT NULL DEFAULT 1,
    position_data TEXT DEFAULT '[]',
    relevance_score REAL DEFAULT 0.0,

    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    CHECK (frequency > 0),
    CHECK (relevance_score >= 0.0 AND relevance_score <= 1.0),
    UNIQUE (document_id, keyword)
);
";

const CREATE_SEARCH_CACHE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS search_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_hash TEXT NOT NULL UNIQUE,
    query_text TEXT NOT NULL,
    results TEXT NOT NULL DEFAULT '[]',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    expires_at TEXT NOT NULL,
    hit_count INTEGER DEFAULT 0,

    CHECK (hit_count >= 0),
    CHECK (expires_at > created_at)
);
";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(file_path);",
    "CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(file_hash);",
    "CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(file_type);",
    "CREATE INDEX IF NOT EXISTS idx_documents_modified ON documents(modified_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_documents_indexed ON documents(indexed_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_metadata_key ON document_metadata(key);",
    "CREATE INDEX IF NOT EXISTS idx_metadata_value ON document_metadata(value);",
    "CREATE INDEX IF NOT EXISTS idx_metadata_document_key ON document_metadata(document_id, key);",
    "CREATE INDEX IF NOT EXISTS idx_search_keyword ON search_index(keyword);",
    "CREATE INDEX IF NOT EXISTS idx_search_relevance ON search_index(relevance_score DESC);",
    "CREATE INDEX IF NOT EXISTS idx_search_keyword_relevance ON search_index(keyword, relevance_score DESC);",
    "CREATE INDEX IF NOT EXISTS idx_search_document_keyword ON search_index(document_id, keyword);",
    "CREATE INDEX IF NOT EXISTS idx_cache_hash ON search_cache(query_hash);",
    "CREATE INDEX IF NOT EXISTS idx_cache_expires ON search_cache(expires_at);",
    "CREATE INDEX IF NOT EXISTS idx_cache_created ON search_cache(created_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_documents_type_modified ON documents(file_type, modified_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_search_freq_score ON search_index(frequency DESC, relevance_score DESC);",
];

// Full-text mirror of documents, kept in sync by the triggers below.
const CREATE_FTS_TABLE: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    file_name,
    content,
    file_type
);
";

const CREATE_FTS_TRIGGERS: &[&str] = &[
    "
    CREATE TRIGGER IF NOT EXISTS documents_fts_insert AFTER INSERT ON documents
    BEGIN
        INSERT INTO documents_fts(rowid, file_name, content, file_type)
        VALUES (NEW.id, NEW.file_name, NEW.content, NEW.file_type);
    END;
    ",
    "
    CREATE TRIGGER IF NOT EXISTS documents_fts_update AFTER UPDATE ON documents
    BEGIN
        UPDATE documents_fts
        SET file_name = NEW.file_name,
            content = NEW.content,
            file_type = NEW.file_type
        WHERE rowid = NEW.id;
    END;
    ",
    "
    CREATE TRIGGER IF NOT EXISTS documents_fts_delete AFTER DELETE ON documents
    BEGIN
        DELETE FROM documents_fts WHERE rowid = OLD.id;
    END;
    ",
];

// ---------------------------------------------------------------------------
// Migration registry
// ---------------------------------------------------------------------------

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
    pub down: fn(&Connection) -> rusqlite::Result<()>,
}

fn initial_up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_DOCUMENTS_TABLE)?;
    conn.execute_batch(CREATE_DOCUMENT_METADATA_TABLE)?;
    conn.execute_batch(CREATE_SEARCH_INDEX_TABLE)?;
    conn.execute_batch(CREATE_SEARCH_CACHE_TABLE)?;
    conn.execute_batch(CREATE_FTS_TABLE)?;
    for sql in CREATE_INDEXES {
        conn.execute_batch(sql)?;
    }
    for sql in CREATE_FTS_TRIGGERS {
        conn.execute_batch(sql)?;
    }
    Ok(())
}

fn initial_down(conn: &Connection) -> rusqlite::Result<()> {
    for trigger in ["documents_fts_insert", "documents_fts_update", "documents_fts_delete"] {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {trigger};"))?;
    }
    conn.execute_batch("DROP TABLE IF EXISTS documents_fts;")?;
    for table in ["search_cache", "search_index", "document_metadata", "documents"] {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }
    Ok(())
}

fn tags_up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS document_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,

            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            UNIQUE (document_id, tag)
        );
        CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag);
        ",
    )
}

fn tags_down(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS document_tags;")
}

/// All known migrations, ascending by version.
pub fn registered_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create initial document, metadata, index and cache schema",
            up: initial_up,
            down: initial_down,
        },
        Migration {
            version: 2,
            description: "Add document tags support",
            up: tags_up,
            down: tags_down,
        },
    ]
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0)).map_err(StoreError::from)
}

pub fn latest_version() -> i64 {
    registered_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

fn ensure_log_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )
    .map_err(StoreError::from)
}

fn apply_up(conn: &mut Connection, migration: &Migration) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Transaction(format!("begin migration {}: {e}", migration.version)))?;
    (migration.up)(&tx).map_err(|e| {
        StoreError::Transaction(format!("migration {} up failed: {e}", migration.version))
    })?;
    tx.execute(
        "INSERT OR REPLACE INTO schema_migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(|e| StoreError::Transaction(format!("record migration {}: {e}", migration.version)))?;
    tx.pragma_update(None, "user_version", migration.version).map_err(|e| {
        StoreError::Transaction(format!("advance user_version to {}: {e}", migration.version))
    })?;
    tx.commit()
        .map_err(|e| StoreError::Transaction(format!("commit migration {}: {e}", migration.version)))?;
    info!(version = migration.version, description = migration.description, "Applied migration");
    Ok(())
}

fn apply_down(conn: &mut Connection, migration: &Migration) -> Result<(), StoreError> {
    let previous = migration.version - 1;
    let tx = conn.transaction().map_err(|e| {
        StoreError::Transaction(format!("begin rollback of {}: {e}", migration.version))
    })?;
    (migration.down)(&tx).map_err(|e| {
        StoreError::Transaction(format!("migration {} down failed: {e}", migration.version))
    })?;
    tx.execute("DELETE FROM schema_migrations WHERE version = ?1", [migration.version])
        .map_err(|e| StoreError::Transaction(format!("unrecord migration: {e}")))?;
    tx.pragma_update(None, "user_version", previous)
        .map_err(|e| StoreError::Transaction(format!("rewind user_version to {previous}: {e}")))?;
    tx.commit().map_err(|e| {
        StoreError::Transaction(format!("commit rollback of {}: {e}", migration.version))
    })?;
    info!(version = migration.version, "Rolled back migration");
    Ok(())
}

/// Apply every registered migration above the current version, ascending.
pub fn migrate_to_latest(conn: &mut Connection) -> Result<i64, StoreError> {
    migrate_to(conn, latest_version())
}

/// Walk the schema to `target`: pending `up`s ascending, or `down`s
/// descending for a rollback.
pub fn migrate_to(conn: &mut Connection, target: i64) -> Result<i64, StoreError> {
    ensure_log_table(conn)?;
    let mut version = current_version(conn)?;
    let mut migrations = registered_migrations();

    if target > version {
        migrations.sort_by_key(|m| m.version);
        let pending: Vec<_> = migrations
            .iter()
            .filter(|m| m.version > version && m.version <= target)
            .collect();
        for migration in pending {
            apply_up(conn, migration)?;
            version = migration.version;
        }
    } else if target < version {
        migrations.sort_by_key(|m| std::cmp::Reverse(m.version));
        let pending: Vec<_> = migrations
            .iter()
            .filter(|m| m.version <= version && m.version > target)
            .collect();
        for migration in pending {
            apply_down(conn, migration)?;
            version = migration.version - 1;
        }
    }

    Ok(version)
}
