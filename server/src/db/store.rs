//! Document store: transactional CRUD over documents, metadata, the
//! inverted index and the query cache.
//!
//! All writes go through closure-scoped transactions on the pooled
//! connection; writes to a single document are linearizable because each
//! database file has exactly one serialized handle. Index rows for a
//! document are always written in the same transaction as its content.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::db::migrations;
use crate::db::models::{to_rfc3339, CacheEntry, Document, IndexEntry, MetadataMap};
use crate::db::pool::ConnectionPool;
use crate::error::{StoreError, ToolError};

const DOCUMENT_COLUMNS: &str = "id, file_path, file_name, content, file_type, file_size, \
     file_hash, created_at, modified_at, indexed_at, metadata_json";

// Same columns qualified with the `d` alias for joined queries.
const DOCUMENT_COLUMNS_D: &str = "d.id, d.file_path, d.file_name, d.content, d.file_type, \
     d.file_size, d.file_hash, d.created_at, d.modified_at, d.indexed_at, d.metadata_json";

/// Sort orders accepted by [`DocumentStore::list_by_type`]. A closed enum so
/// ORDER BY clauses are never interpolated from caller strings.
#[derive(Debug, Clone, Copy)]
pub enum DocumentOrder {
    IndexedDesc,
    ModifiedDesc,
    NameAsc,
}

impl DocumentOrder {
    fn as_sql(self) -> &'static str {
        match self {
            DocumentOrder::IndexedDesc => "indexed_at DESC",
            DocumentOrder::ModifiedDesc => "modified_at DESC",
            DocumentOrder::NameAsc => "file_name COLLATE NOCASE ASC",
        }
    }
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| DateTime::parse_from_rfc3339(&v).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: Some(row.get(0)?),
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        content: row.get(3)?,
        file_type: row.get(4)?,
        file_size: row.get(5)?,
        file_hash: row.get(6)?,
        created_at: parse_ts(row.get(7)?),
        modified_at: parse_ts(row.get(8)?),
        indexed_at: parse_ts(row.get(9)?),
        metadata_json: row.get::<_, Option<String>>(10)?.unwrap_or_else(|| "{}".to_string()),
    })
}

/// Outcome of a transactional ingest.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub document_id: i64,
    /// True when the path was already present and the row was rewritten.
    pub existed: bool,
}

/// Store-wide row counts.
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    pub total_documents: i64,
    pub documents_by_type: Vec<(String, i64)>,
    pub index_entries: i64,
    pub metadata_entries: i64,
    pub cache_entries: i64,
}

pub struct DocumentStore {
    pool: Arc<ConnectionPool>,
    db_path: PathBuf,
}

impl DocumentStore {
    pub fn new(pool: Arc<ConnectionPool>, db_path: PathBuf) -> Self {
        Self { pool, db_path }
    }

    async fn run<T, F>(&self, label: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.run(&self.db_path, label, f).await
    }

    /// Apply pending schema migrations. Called once at startup.
    pub async fn initialize(&self) -> Result<i64, StoreError> {
        self.run("migrate", |conn| migrations::migrate_to_latest(conn)).await
    }

    // -----------------------------------------------------------------------
    // Document CRUD
    // -----------------------------------------------------------------------

    pub async fn create_document(&self, document: &Document) -> Result<i64, ToolError> {
        let doc = document.clone();
        let id = self
            .run("create_document", move |conn| {
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM documents WHERE file_path = ?1",
                        [&doc.file_path],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    // Surfaced as Duplicate by the caller; keep the path in
                    // the message so the envelope can echo it.
                    return Err(StoreError::Query(format!("duplicate path {}", doc.file_path)));
                }
                insert_document(conn, &doc)?;
                let id = conn.last_insert_rowid();
                conn.execute(
                    "DELETE FROM search_cache WHERE expires_at <= ?1",
                    [to_rfc3339(Utc::now())],
                )?;
                Ok(id)
            })
            .await
            .map_err(|e| match &e {
                StoreError::Query(msg) if msg.starts_with("duplicate path") => {
                    ToolError::Duplicate(document.file_path.clone())
                }
                _ => ToolError::Store(e),
            })?;
        debug!(document_id = id, "Created document");
        Ok(id)
    }

    pub async fn update_document(&self, document: &Document) -> Result<(), ToolError> {
        let doc = document.clone();
        let id = doc.id.ok_or_else(|| ToolError::Internal("update without id".to_string()))?;
        let updated = self
            .run("update_document", move |conn| {
                let rows = conn.execute(
                    "UPDATE documents
                     SET file_path = ?1, file_name = ?2, content = ?3, file_type = ?4,
                         file_size = ?5, file_hash = ?6, created_at = ?7, modified_at = ?8,
                         indexed_at = ?9, metadata_json = ?10
                     WHERE id = ?11",
                    params![
                        doc.file_path,
                        doc.file_name,
                        doc.content,
                        doc.file_type,
                        doc.file_size,
                        doc.file_hash,
                        doc.created_at.map(to_rfc3339),
                        doc.modified_at.map(to_rfc3339),
                        doc.indexed_at.map(to_rfc3339),
                        doc.metadata_json,
                        id,
                    ],
                )?;
                conn.execute(
                    "DELETE FROM search_cache WHERE expires_at <= ?1",
                    [to_rfc3339(Utc::now())],
                )?;
                Ok(rows > 0)
            })
            .await?;
        if !updated {
            return Err(ToolError::NotFound(format!("Document with ID {id} not found")));
        }
        Ok(())
    }

    pub async fn get_by_id(&self, document_id: i64) -> Result<Option<Document>, ToolError> {
        let doc = self
            .run("get_by_id", move |conn| {
                conn.query_row(
                    &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                    [document_id],
                    row_to_document,
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;
        Ok(doc)
    }

    pub async fn get_by_path(&self, file_path: &str) -> Result<Option<Document>, ToolError> {
        let path = file_path.to_string();
        let doc = self
            .run("get_by_path", move |conn| {
                conn.query_row(
                    &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_path = ?1"),
                    [&path],
                    row_to_document,
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;
        Ok(doc)
    }

    pub async fn list_by_type(
        &self,
        file_type: Option<String>,
        limit: usize,
        offset: usize,
        order: DocumentOrder,
    ) -> Result<Vec<Document>, ToolError> {
        let docs = self
            .run("list_by_type", move |conn| {
                let order_sql = order.as_sql();
                let (sql, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match file_type {
                    Some(ft) => (
                        format!(
                            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_type = ?1 \
                             ORDER BY {order_sql} LIMIT ?2 OFFSET ?3"
                        ),
                        vec![Box::new(ft), Box::new(limit as i64), Box::new(offset as i64)],
                    ),
                    None => (
                        format!(
                            "SELECT {DOCUMENT_COLUMNS} FROM documents \
                             ORDER BY {order_sql} LIMIT ?1 OFFSET ?2"
                        ),
                        vec![Box::new(limit as i64), Box::new(offset as i64)],
                    ),
                };
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())), row_to_document)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(docs)
    }

    pub async fn count_documents(&self, file_type: Option<String>) -> Result<i64, ToolError> {
        let count = self
            .run("count_documents", move |conn| {
                let count = match file_type {
                    Some(ft) => conn.query_row(
                        "SELECT COUNT(*) FROM documents WHERE file_type = ?1",
                        [&ft],
                        |row| row.get(0),
                    )?,
                    None => {
                        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?
                    }
                };
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Delete by id; metadata, index entries and the FTS mirror cascade.
    pub async fn delete_document(&self, document_id: i64) -> Result<bool, ToolError> {
        let now = to_rfc3339(Utc::now());
        let deleted = self
            .run("delete_document", move |conn| {
                let tx = begin(conn)?;
                let rows = tx.execute("DELETE FROM documents WHERE id = ?1", [document_id])?;
                tx.execute("DELETE FROM search_cache WHERE expires_at <= ?1", [&now])?;
                commit(tx)?;
                Ok(rows > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Delete by path; used by the watcher for removal events.
    pub async fn delete_by_path(&self, file_path: &str) -> Result<bool, ToolError> {
        let path = file_path.to_string();
        let now = to_rfc3339(Utc::now());
        let deleted = self
            .run("delete_by_path", move |conn| {
                let tx = begin(conn)?;
                let rows = tx.execute("DELETE FROM documents WHERE file_path = ?1", [&path])?;
                tx.execute("DELETE FROM search_cache WHERE expires_at <= ?1", [&now])?;
                commit(tx)?;
                Ok(rows > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Rewrite the path column of a moved document. Derived fields are
    /// refreshed by the reindex that follows.
    pub async fn rename_path(&self, old_path: &str, new_path: &str) -> Result<bool, ToolError> {
        let (old_path, new_path) = (old_path.to_string(), new_path.to_string());
        let renamed = self
            .run("rename_path", move |conn| {
                let rows = conn.execute(
                    "UPDATE documents SET file_path = ?1 WHERE file_path = ?2",
                    params![new_path, old_path],
                )?;
                Ok(rows > 0)
            })
            .await?;
        Ok(renamed)
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    pub async fn get_metadata(&self, document_id: i64) -> Result<MetadataMap, ToolError> {
        let map = self
            .run("get_metadata", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM document_metadata WHERE document_id = ?1 ORDER BY key",
                )?;
                let rows = stmt
                    .query_map([document_id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<MetadataMap>>()?;
                Ok(rows)
            })
            .await?;
        Ok(map)
    }

    /// Documents matching any of the given metadata key/value filters,
    /// newest first.
    pub async fn search_by_metadata(
        &self,
        filters: MetadataMap,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, ToolError> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .run("search_by_metadata", move |conn| {
                let conditions =
                    vec!["(dm.key = ? AND dm.value = ?)"; filters.len()].join(" OR ");
                let sql = format!(
                    "SELECT DISTINCT {DOCUMENT_COLUMNS_D}
                     FROM documents d
                     JOIN document_metadata dm ON d.id = dm.document_id
                     WHERE {conditions}
                     ORDER BY d.indexed_at DESC
                     LIMIT ? OFFSET ?"
                );
                let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                for (key, value) in &filters {
                    params.push(Box::new(key.clone()));
                    params.push(Box::new(value.clone()));
                }
                params.push(Box::new(limit as i64));
                params.push(Box::new(offset as i64));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                        row_to_document,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(docs)
    }

    /// Row counts across the store, for diagnostics and logging.
    pub async fn statistics(&self) -> Result<StoreStatistics, ToolError> {
        let stats = self
            .run("statistics", |conn| {
                let total_documents: i64 =
                    conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
                let mut stmt = conn.prepare(
                    "SELECT file_type, COUNT(*) FROM documents GROUP BY file_type ORDER BY file_type",
                )?;
                let documents_by_type = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let index_entries: i64 =
                    conn.query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
                let cache_entries: i64 =
                    conn.query_row("SELECT COUNT(*) FROM search_cache", [], |row| row.get(0))?;
                let metadata_entries: i64 = conn
                    .query_row("SELECT COUNT(*) FROM document_metadata", [], |row| row.get(0))?;
                Ok(StoreStatistics {
                    total_documents,
                    documents_by_type,
                    index_entries,
                    metadata_entries,
                    cache_entries,
                })
            })
            .await?;
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Inverted index
    // -----------------------------------------------------------------------

    /// Candidate rows for a set of query terms: each matched document with
    /// its summed `relevance * frequency` base score.
    pub async fn keyword_rows(
        &self,
        terms: Vec<String>,
        file_type: Option<String>,
        limit: usize,
    ) -> Result<Vec<(Document, f64)>, ToolError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .run("keyword_rows", move |conn| {
                let placeholders =
                    (1..=terms.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(",");
                let mut sql = format!(
                    "SELECT {DOCUMENT_COLUMNS_D}, SUM(si.relevance_score * si.frequency) AS total_score
                     FROM documents d
                     JOIN search_index si ON d.id = si.document_id
                     WHERE si.keyword IN ({placeholders})"
                );
                let mut params: Vec<Box<dyn rusqlite::ToSql>> =
                    terms.iter().map(|t| Box::new(t.clone()) as Box<dyn rusqlite::ToSql>).collect();
                if let Some(ft) = file_type {
                    sql.push_str(&format!(" AND d.file_type = ?{}", params.len() + 1));
                    params.push(Box::new(ft));
                }
                sql.push_str(&format!(
                    " GROUP BY d.id ORDER BY total_score DESC, d.indexed_at DESC LIMIT ?{}",
                    params.len() + 1
                ));
                params.push(Box::new(limit as i64));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                        |row| {
                            let doc = row_to_document(row)?;
                            let score: f64 = row.get(11)?;
                            Ok((doc, score))
                        },
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Secondary lookup over the FTS5 mirror. The keyword index remains the
    /// ranking contract; this serves phrase-style probes.
    pub async fn full_text_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Document, f64)>, ToolError> {
        let match_query = escape_fts_query(query);
        let rows = self
            .run("full_text_search", move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS_D}, fts.rank
                     FROM documents_fts fts
                     JOIN documents d ON fts.rowid = d.id
                     WHERE documents_fts MATCH ?1
                     ORDER BY fts.rank
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![match_query, limit as i64], |row| {
                        let doc = row_to_document(row)?;
                        // FTS5 rank is negative; flip it so higher is better.
                        let rank: f64 = row.get(11)?;
                        Ok((doc, rank.abs()))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    #[cfg(test)]
    pub async fn index_entries_for(&self, document_id: i64) -> Result<Vec<IndexEntry>, ToolError> {
        let entries = self
            .run("index_entries_for", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT keyword, frequency, position_data, relevance_score
                     FROM search_index WHERE document_id = ?1 ORDER BY keyword",
                )?;
                let rows = stmt
                    .query_map([document_id], |row| {
                        let positions =
                            IndexEntry::positions_from_data(&row.get::<_, String>(2)?);
                        Ok(IndexEntry {
                            document_id,
                            keyword: row.get(0)?,
                            frequency: row.get(1)?,
                            positions,
                            relevance_score: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(entries)
    }

    #[cfg(test)]
    pub async fn metadata_row_count(&self, document_id: i64) -> Result<i64, ToolError> {
        let count = self
            .run("metadata_row_count", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM document_metadata WHERE document_id = ?1",
                    [document_id],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Query cache
    // -----------------------------------------------------------------------

    /// Fetch a non-expired cache entry and bump its hit count.
    pub async fn cache_get(&self, query_hash: &str) -> Result<Option<CacheEntry>, ToolError> {
        let hash = query_hash.to_string();
        let now = to_rfc3339(Utc::now());
        let entry = self
            .run("cache_get", move |conn| {
                let entry = conn
                    .query_row(
                        "SELECT query_hash, query_text, results, created_at, expires_at, hit_count
                         FROM search_cache
                         WHERE query_hash = ?1 AND expires_at > ?2",
                        params![hash, now],
                        |row| {
                            Ok(CacheEntry {
                                query_hash: row.get(0)?,
                                query_text: row.get(1)?,
                                results: row.get(2)?,
                                created_at: parse_ts(row.get(3)?).unwrap_or_else(Utc::now),
                                expires_at: parse_ts(row.get(4)?).unwrap_or_else(Utc::now),
                                hit_count: row.get(5)?,
                            })
                        },
                    )
                    .optional()?;
                if let Some(entry) = &entry {
                    conn.execute(
                        "UPDATE search_cache SET hit_count = hit_count + 1 WHERE query_hash = ?1",
                        [&entry.query_hash],
                    )?;
                }
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn cache_put(&self, entry: CacheEntry) -> Result<(), ToolError> {
        self.run("cache_put", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO search_cache
                 (query_hash, query_text, results, created_at, expires_at, hit_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.query_hash,
                    entry.query_text,
                    entry.results,
                    to_rfc3339(entry.created_at),
                    to_rfc3339(entry.expires_at),
                    entry.hit_count,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Delete expired cache rows. Returns how many were removed.
    pub async fn sweep_expired_cache(&self) -> Result<usize, ToolError> {
        let now = to_rfc3339(Utc::now());
        let swept = self
            .run("sweep_expired_cache", move |conn| {
                let rows =
                    conn.execute("DELETE FROM search_cache WHERE expires_at <= ?1", [&now])?;
                Ok(rows)
            })
            .await?;
        if swept > 0 {
            debug!(swept, "Swept expired cache entries");
        }
        Ok(swept)
    }

    // -----------------------------------------------------------------------
    // Transactional ingest
    // -----------------------------------------------------------------------

    /// Full ingest of one parsed document: the document row (insert, or
    /// update preserving `created_at`), its metadata rows and its inverted
    /// index rows, all inside a single transaction. A cache sweep follows.
    pub async fn index_document(
        &self,
        mut document: Document,
        metadata: MetadataMap,
        mut entries: Vec<IndexEntry>,
    ) -> Result<IngestOutcome, ToolError> {
        let now = to_rfc3339(Utc::now());
        let outcome = self
            .run("index_document", move |conn| {
                let tx = begin(conn)?;

                let existing: Option<(i64, Option<String>)> = tx
                    .query_row(
                        "SELECT id, created_at FROM documents WHERE file_path = ?1",
                        [&document.file_path],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let (document_id, existed) = match existing {
                    Some((id, created_at)) => {
                        document.id = Some(id);
                        document.created_at = parse_ts(created_at).or(document.created_at);
                        tx.execute(
                            "UPDATE documents
                             SET file_name = ?1, content = ?2, file_type = ?3, file_size = ?4,
                                 file_hash = ?5, created_at = ?6, modified_at = ?7,
                                 indexed_at = ?8, metadata_json = ?9
                             WHERE id = ?10",
                            params![
                                document.file_name,
                                document.content,
                                document.file_type,
                                document.file_size,
                                document.file_hash,
                                document.created_at.map(to_rfc3339),
                                document.modified_at.map(to_rfc3339),
                                document.indexed_at.map(to_rfc3339),
                                document.metadata_json,
                                id,
                            ],
                        )?;
                        (id, true)
                    }
                    None => {
                        insert_document(&tx, &document)?;
                        (tx.last_insert_rowid(), false)
                    }
                };

                // Old metadata and index rows are replaced wholesale.
                tx.execute("DELETE FROM document_metadata WHERE document_id = ?1", [document_id])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR REPLACE INTO document_metadata
                         (document_id, key, value, extracted_at)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for (key, value) in &metadata {
                        if key.is_empty() || value.is_empty() {
                            continue;
                        }
                        stmt.execute(params![document_id, key, value, now])?;
                    }
                }

                tx.execute("DELETE FROM search_index WHERE document_id = ?1", [document_id])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR REPLACE INTO search_index
                         (document_id, keyword, frequency, position_data, relevance_score)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for entry in entries.iter_mut() {
                        entry.document_id = document_id;
                        stmt.execute(params![
                            document_id,
                            entry.keyword,
                            entry.frequency,
                            entry.position_data(),
                            entry.relevance_score,
                        ])?;
                    }
                }

                tx.execute("DELETE FROM search_cache WHERE expires_at <= ?1", [&now])?;
                commit(tx)?;
                Ok(IngestOutcome { document_id, existed })
            })
            .await?;
        Ok(outcome)
    }
}

fn insert_document(conn: &Connection, doc: &Document) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO documents
         (file_path, file_name, content, file_type, file_size, file_hash,
          created_at, modified_at, indexed_at, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            doc.file_path,
            doc.file_name,
            doc.content,
            doc.file_type,
            doc.file_size,
            doc.file_hash,
            doc.created_at.map(to_rfc3339),
            doc.modified_at.map(to_rfc3339),
            doc.indexed_at.map(to_rfc3339),
            doc.metadata_json,
        ],
    )?;
    Ok(())
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    conn.transaction().map_err(|e| StoreError::Transaction(format!("begin: {e}")))
}

fn commit(tx: Transaction<'_>) -> Result<(), StoreError> {
    tx.commit().map_err(|e| StoreError::Transaction(format!("commit: {e}")))
}

/// Quote query tokens for FTS5 MATCH. Binding protects against SQL
/// injection but not against FTS mini-language syntax errors, so any token
/// with a non-alphanumeric character is double-quoted.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            if tok.chars().all(|c| c.is_alphanumeric()) {
                tok.to_string()
            } else {
                format!("\"{}\"", tok.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
