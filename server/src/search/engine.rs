//! Query execution: cache lookup, index scoring, composite re-ranking,
//! sorting, enrichment and cache insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::db::models::{to_rfc3339, CacheEntry, Document, MetadataMap};
use crate::db::DocumentStore;
use crate::error::ToolError;
use crate::search::snippet::generate_snippet;
use crate::search::tokenize::normalize_query;

/// Sort orders accepted by `searchDocuments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Relevance,
    Date,
    Name,
}

impl SortBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "relevance" => Some(SortBy::Relevance),
            "date" => Some(SortBy::Date),
            "name" => Some(SortBy::Name),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Date => "date",
            SortBy::Name => "name",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    pub limit: usize,
    pub file_type: Option<String>,
    pub sort_by: SortBy,
}

/// One enriched search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub relevance_score: f64,
    pub indexed_at: Option<String>,
    pub modified_at: Option<String>,
    pub content_snippet: String,
    pub metadata: MetadataMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_found: usize,
    pub returned_count: usize,
    pub search_time_ms: f64,
    pub query_processed: String,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

// ---------------------------------------------------------------------------
// Composite scoring
// ---------------------------------------------------------------------------

/// Filename bonus: 10 per matched term, capped at 30.
fn title_relevance(file_name: &str, terms: &[String]) -> f64 {
    let name_lower = file_name.to_lowercase();
    let score = terms.iter().filter(|t| name_lower.contains(t.as_str())).count() as f64 * 10.0;
    score.min(30.0)
}

/// Body bonus: half a point per occurrence, 5 per term, 15 overall.
fn content_relevance(content: &str, terms: &[String]) -> f64 {
    if content.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let score: f64 = terms
        .iter()
        .map(|t| (content_lower.matches(t.as_str()).count() as f64 * 0.5).min(5.0))
        .sum();
    score.min(15.0)
}

/// Recency bonus bucketed by the age of `indexed_at`.
fn recency_score(indexed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match indexed_at {
        None => 0.0,
        Some(ts) => {
            let days = (now - ts).num_days();
            if days <= 7 {
                5.0
            } else if days <= 30 {
                3.0
            } else if days <= 90 {
                1.0
            } else {
                0.5
            }
        }
    }
}

fn composite_score(doc: &Document, base: f64, terms: &[String], now: DateTime<Utc>) -> f64 {
    base * 0.4
        + title_relevance(&doc.file_name, terms) * 0.3
        + content_relevance(&doc.content, terms) * 0.2
        + recency_score(doc.indexed_at, now) * 0.1
}

/// Deterministic digest over the normalized query plus every filter
/// parameter that shapes the result set.
pub fn query_hash(normalized_query: &str, limit: usize, file_type: Option<&str>, sort_by: SortBy) -> String {
    let canonical =
        format!("{normalized_query}|{limit}|{}|{}", file_type.unwrap_or(""), sort_by.as_str());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Map the accepted `file_type` spellings onto the stored extension tag.
pub fn normalize_file_type(file_type: &str) -> String {
    match file_type.to_lowercase().trim() {
        "md" | "markdown" | ".md" => "md".to_string(),
        "txt" | "text" | ".txt" => "txt".to_string(),
        other => other.trim_start_matches('.').to_string(),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SearchEngine {
    store: Arc<DocumentStore>,
    cache_enabled: bool,
    cache_ttl: Duration,
}

impl SearchEngine {
    pub fn new(store: Arc<DocumentStore>, cache_enabled: bool, cache_ttl: Duration) -> Self {
        Self { store, cache_enabled, cache_ttl }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Execute the full query path for `searchDocuments`.
    pub async fn search(&self, options: SearchOptions) -> Result<SearchResponse, ToolError> {
        let started = Instant::now();

        let terms = normalize_query(&options.query);
        if terms.is_empty() {
            return Err(ToolError::InvalidQuery(
                "Query contains no valid search terms".to_string(),
            ));
        }
        let normalized = terms.join(" ");
        let file_type = options.file_type.as_deref().map(normalize_file_type);

        let hash = query_hash(&normalized, options.limit, file_type.as_deref(), options.sort_by);

        if self.cache_enabled {
            if let Some(entry) = self.store.cache_get(&hash).await? {
                if let Ok(mut cached) = serde_json::from_str::<SearchResponse>(&entry.results) {
                    debug!(query = %options.query, "Search cache hit");
                    cached.search_time_ms = elapsed_ms(started);
                    cached.from_cache = true;
                    return Ok(cached);
                }
            }
        }

        // Over-fetch so the composite re-rank has candidates to promote.
        let rows =
            self.store.keyword_rows(terms.clone(), file_type.clone(), options.limit * 2).await?;
        let total_found = rows.len();

        let now = Utc::now();
        let mut scored: Vec<(Document, f64)> = rows
            .into_iter()
            .map(|(doc, base)| {
                let score = composite_score(&doc, base, &terms, now);
                (doc, score)
            })
            .collect();

        match options.sort_by {
            SortBy::Relevance => {
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
            }
            SortBy::Date => scored.sort_by(|a, b| b.0.indexed_at.cmp(&a.0.indexed_at)),
            SortBy::Name => scored
                .sort_by(|a, b| a.0.file_name.to_lowercase().cmp(&b.0.file_name.to_lowercase())),
        }
        scored.truncate(options.limit);

        let mut results = Vec::with_capacity(scored.len());
        for (doc, score) in scored {
            let document_id =
                doc.id.ok_or_else(|| ToolError::Internal("document without id".to_string()))?;
            let metadata = self.store.get_metadata(document_id).await?;
            results.push(SearchHit {
                document_id,
                file_path: doc.file_path,
                file_name: doc.file_name,
                file_type: doc.file_type,
                file_size_bytes: doc.file_size,
                relevance_score: round3(score),
                indexed_at: doc.indexed_at.map(to_rfc3339),
                modified_at: doc.modified_at.map(to_rfc3339),
                content_snippet: generate_snippet(&doc.content, &terms),
                metadata,
            });
        }

        let response = SearchResponse {
            returned_count: results.len(),
            results,
            total_found,
            search_time_ms: elapsed_ms(started),
            query_processed: normalized.clone(),
            from_cache: false,
            file_type_filter: file_type,
            sort_by: (options.sort_by != SortBy::Relevance).then(|| options.sort_by.as_str().to_string()),
        };

        if self.cache_enabled {
            let now = Utc::now();
            let ttl = chrono::Duration::from_std(self.cache_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
            let entry = CacheEntry {
                query_hash: hash,
                query_text: normalized,
                results: serde_json::to_string(&response)
                    .map_err(|e| ToolError::Internal(format!("serialize cache entry: {e}")))?,
                created_at: now,
                expires_at: now + ttl,
                hit_count: 0,
            };
            self.store.cache_put(entry).await?;
        }

        info!(
            query = %options.query,
            results = response.returned_count,
            time_ms = response.search_time_ms,
            "Search completed"
        );
        Ok(response)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn title_bonus_is_capped() {
        assert_eq!(title_relevance("notes.md", &terms(&["notes"])), 10.0);
        let many = terms(&["a", "b", "c", "d", "e"]);
        assert_eq!(title_relevance("abcde", &many), 30.0);
        assert_eq!(title_relevance("other.txt", &terms(&["missing"])), 0.0);
    }

    #[test]
    fn content_bonus_caps_per_term_and_total() {
        let body = "alpha ".repeat(100);
        assert_eq!(content_relevance(&body, &terms(&["alpha"])), 5.0);
        let body = "alpha beta gamma delta ".repeat(100);
        assert_eq!(content_relevance(&body, &terms(&["alpha", "beta", "gamma", "delta"])), 15.0);
        assert_eq!(content_relevance("", &terms(&["alpha"])), 0.0);
    }

    #[test]
    fn recency_buckets() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now - chrono::Duration::days(1)), now), 5.0);
        assert_eq!(recency_score(Some(now - chrono::Duration::days(20)), now), 3.0);
        assert_eq!(recency_score(Some(now - chrono::Duration::days(60)), now), 1.0);
        assert_eq!(recency_score(Some(now - chrono::Duration::days(400)), now), 0.5);
        assert_eq!(recency_score(None, now), 0.0);
    }

    #[test]
    fn query_hash_is_deterministic_and_filter_sensitive() {
        let a = query_hash("hello world", 10, None, SortBy::Relevance);
        let b = query_hash("hello world", 10, None, SortBy::Relevance);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, query_hash("hello world", 20, None, SortBy::Relevance));
        assert_ne!(a, query_hash("hello world", 10, Some("md"), SortBy::Relevance));
        assert_ne!(a, query_hash("hello world", 10, None, SortBy::Name));
    }

    #[test]
    fn file_type_spellings_normalize() {
        for spelling in ["md", "markdown", ".md", "MD"] {
            assert_eq!(normalize_file_type(spelling), "md");
        }
        for spelling in ["txt", "text", ".txt"] {
            assert_eq!(normalize_file_type(spelling), "txt");
        }
    }

    #[test]
    fn sort_by_parses_known_values_only() {
        assert_eq!(SortBy::parse("relevance"), Some(SortBy::Relevance));
        assert_eq!(SortBy::parse("date"), Some(SortBy::Date));
        assert_eq!(SortBy::parse("name"), Some(SortBy::Name));
        assert_eq!(SortBy::parse("size"), None);
    }
}
