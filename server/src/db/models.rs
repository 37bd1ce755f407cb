//! Value types persisted by the document store.
//!
//! The store is the single owner of every entity here; components above it
//! hold integer ids or read-only copies. Relations are id-based, there are
//! no pointer cycles.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Lowercase hex SHA-256 digest of `content`, the canonical content hash.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// RFC 3339 timestamp with second precision, the format stored in the DB
/// and emitted on the wire.
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Canonical record of one ingested file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Assigned by the store on first insert, stable thereafter.
    pub id: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub content: String,
    /// Lowercased extension without the leading dot.
    pub file_type: String,
    /// Byte length of `content`.
    pub file_size: i64,
    /// SHA-256 hex digest of `content`.
    pub file_hash: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub indexed_at: Option<DateTime<Utc>>,
    /// Raw parser metadata bag, serialized as JSON.
    pub metadata_json: String,
}

impl Document {
    /// Build a document record from a path and its extracted content,
    /// deriving name, type, size and hash.
    pub fn from_content(file_path: &str, content: String) -> Self {
        let path = Path::new(file_path);
        let file_name =
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let file_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let file_size = content.len() as i64;
        let file_hash = sha256_hex(&content);
        Self {
            id: None,
            file_path: file_path.to_string(),
            file_name,
            content,
            file_type,
            file_size,
            file_hash,
            created_at: None,
            modified_at: None,
            indexed_at: None,
            metadata_json: "{}".to_string(),
        }
    }

    /// Parse `metadata_json` back into a map; malformed JSON yields empty.
    pub fn parsed_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::from_str(&self.metadata_json).unwrap_or_default()
    }
}

/// One `(document, keyword)` row of the inverted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document_id: i64,
    /// Lowercase keyword, length >= 3 unless whitelisted short.
    pub keyword: String,
    /// Occurrence count; always equals `positions.len()`.
    pub frequency: i64,
    /// Ordered token positions of each occurrence.
    pub positions: Vec<usize>,
    /// Ingest-time relevance in [0, 1].
    pub relevance_score: f64,
}

impl IndexEntry {
    pub fn new(document_id: i64, keyword: String, positions: Vec<usize>) -> Self {
        let frequency = positions.len() as i64;
        Self { document_id, keyword, frequency, positions, relevance_score: 0.0 }
    }

    /// `tf * (1 + min(1, frequency/5))` with `tf = frequency/total_words`,
    /// clamped to [0, 1].
    pub fn compute_relevance(&mut self, total_words: usize) -> f64 {
        if total_words == 0 {
            self.relevance_score = 0.0;
            return 0.0;
        }
        let tf = self.frequency as f64 / total_words as f64;
        let frequency_boost = (self.frequency as f64 / 5.0).min(1.0);
        self.relevance_score = (tf * (1.0 + frequency_boost)).clamp(0.0, 1.0);
        self.relevance_score
    }

    /// Positions serialized as the JSON array stored in `position_data`.
    pub fn position_data(&self) -> String {
        serde_json::to_string(&self.positions).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn positions_from_data(data: &str) -> Vec<usize> {
        serde_json::from_str(data).unwrap_or_default()
    }
}

/// One cached query result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_hash: String,
    pub query_text: String,
    /// Serialized result payload, returned verbatim on a hit.
    pub results: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Metadata key/value rows for a document, as a map.
pub type MetadataMap = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_derives_fields_from_path_and_content() {
        let doc = Document::from_content("/notes/Project Plan.MD", "# plan".to_string());
        assert_eq!(doc.file_name, "Project Plan.MD");
        assert_eq!(doc.file_type, "md");
        assert_eq!(doc.file_size, 6);
        assert_eq!(doc.file_hash, sha256_hex("# plan"));
        assert_eq!(doc.file_hash.len(), 64);
    }

    #[test]
    fn document_size_counts_bytes_not_chars() {
        let doc = Document::from_content("/tmp/u.txt", "héllo".to_string());
        assert_eq!(doc.file_size, 6);
    }

    #[test]
    fn hash_matches_content_after_construction() {
        let body = "red blue green";
        let doc = Document::from_content("/tmp/b.txt", body.to_string());
        assert_eq!(doc.file_hash, sha256_hex(body));
    }

    #[test]
    fn relevance_stays_in_unit_interval() {
        // A word making up the whole document would push tf*boost past 1.0
        // without the clamp.
        let mut entry = IndexEntry::new(1, "word".to_string(), (0..10).collect());
        let score = entry.compute_relevance(10);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, 1.0);

        let mut entry = IndexEntry::new(1, "rare".to_string(), vec![3]);
        let score = entry.compute_relevance(100);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn relevance_is_zero_for_empty_document() {
        let mut entry = IndexEntry::new(1, "word".to_string(), vec![0]);
        assert_eq!(entry.compute_relevance(0), 0.0);
    }

    #[test]
    fn frequency_tracks_positions() {
        let entry = IndexEntry::new(7, "alpha".to_string(), vec![0, 4, 9]);
        assert_eq!(entry.frequency, 3);
        let round_trip = IndexEntry::positions_from_data(&entry.position_data());
        assert_eq!(round_trip, vec![0, 4, 9]);
    }

    #[test]
    fn cache_entry_expiry() {
        let now = Utc::now();
        let entry = CacheEntry {
            query_hash: "h".into(),
            query_text: "q".into(),
            results: "[]".into(),
            created_at: now,
            expires_at: now + chrono::Duration::minutes(30),
            hit_count: 0,
        };
        assert!(entry.expires_at > entry.created_at);
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + chrono::Duration::minutes(31)));
    }
}
