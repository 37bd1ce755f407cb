//! Document parsers: turn raw file bytes into normalized text, structured
//! metadata and a keyword list.
//!
//! Implementations register the extensions they handle; the registry selects
//! by extension with a plain-text fallback. Rich metadata values are coerced
//! to strings by [`normalize_metadata`] before they reach the store.

pub mod markdown;
pub mod text;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::db::models::{sha256_hex, MetadataMap};
use crate::error::ToolError;
use crate::search::tokenize::STOP_WORDS;

/// Upper bound on keywords surfaced per document.
const MAX_KEYWORDS: usize = 100;
const MIN_KEYWORD_LENGTH: usize = 3;

/// Output of parsing one document's content.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Text cleaned for indexing (markup stripped, whitespace normalized).
    pub content: String,
    /// Rich metadata; coerced to strings at persistence time.
    pub metadata: Map<String, Value>,
    /// Frequency-ranked keywords.
    pub keywords: Vec<String>,
}

/// Filesystem facts about the parsed file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_extension: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub file_hash: String,
}

/// A fully parsed file: content outcome plus file info and timing.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub outcome: ParseOutcome,
    pub file_info: FileInfo,
    pub parser_name: &'static str,
    pub parse_time_ms: f64,
}

pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn supported_extensions(&self) -> &'static [&'static str];
    fn parse(&self, content: &str, file_path: Option<&str>) -> Result<ParseOutcome, ToolError>;
}

// ---------------------------------------------------------------------------
// Shared keyword extraction
// ---------------------------------------------------------------------------

fn keyword_word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b[a-zA-Z0-9_]+\b").expect("keyword regex"))
}

/// Frequency-ranked keyword list shared by all parsers. Filters stop words,
/// short words and pure digits; ties break alphabetically so the ranking is
/// deterministic.
pub fn keyword_list(content: &str, extra_stop_words: &[&str]) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let lowered = content.to_lowercase();
    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for m in keyword_word_regex().find_iter(&lowered) {
        let word = m.as_str();
        if word.len() < MIN_KEYWORD_LENGTH
            || word.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&word)
            || extra_stop_words.contains(&word)
        {
            continue;
        }
        *frequencies.entry(word).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = frequencies.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(MAX_KEYWORDS).map(|(word, _)| word.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Metadata coercion (parser → database adapter)
// ---------------------------------------------------------------------------

/// Coerce rich metadata to the string key/value pairs the store persists:
/// strings pass through, numbers and booleans stringify, lists and maps are
/// JSON-encoded, nulls are dropped.
pub fn normalize_metadata(metadata: &Map<String, Value>) -> MetadataMap {
    let mut normalized = MetadataMap::new();
    for (key, value) in metadata {
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(value).unwrap_or_default()
            }
        };
        normalized.insert(key.clone(), rendered);
    }
    normalized
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Extension-keyed parser factory with a text fallback.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
    fallback: Arc<dyn DocumentParser>,
}

impl ParserRegistry {
    pub fn with_defaults() -> Self {
        Self {
            parsers: vec![
                Arc::new(markdown::MarkdownParser::new()),
                Arc::new(text::TextParser::new()),
            ],
            fallback: Arc::new(text::TextParser::new()),
        }
    }

    fn extension_of(path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }

    /// Select the parser for a path; unknown extensions fall back to text.
    pub fn parser_for(&self, path: &Path) -> Arc<dyn DocumentParser> {
        let ext = Self::extension_of(path);
        for parser in &self.parsers {
            if parser.supported_extensions().contains(&ext.as_str()) {
                return Arc::clone(parser);
            }
        }
        Arc::clone(&self.fallback)
    }

    pub fn registered_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> =
            self.parsers.iter().flat_map(|p| p.supported_extensions().iter().copied()).collect();
        extensions.sort_unstable();
        extensions.dedup();
        extensions
    }

    /// Read and parse a file from disk: existence and type checks, lossy
    /// UTF-8 fallback, file-info collection and timing.
    pub async fn parse_file(&self, path: &Path) -> Result<ParsedFile, ToolError> {
        let started = Instant::now();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| ToolError::NotFound(format!("File not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(ToolError::ParseFailed(format!("Path is not a file: {}", path.display())));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ToolError::ParseFailed(format!("read {}: {e}", path.display())))?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        let file_info = FileInfo {
            file_path: path.to_string_lossy().into_owned(),
            file_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            file_size: metadata.len(),
            file_extension: Self::extension_of(path),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            file_hash: sha256_hex(&content),
        };

        let parser = self.parser_for(path);
        let outcome = parser.parse(&content, Some(&file_info.file_path))?;

        let parse_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            file = %file_info.file_name,
            parser = parser.name(),
            time_ms = parse_time_ms,
            keywords = outcome.keywords.len(),
            "Parsed file"
        );

        Ok(ParsedFile { outcome, file_info, parser_name: parser.name(), parse_time_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_list_ranks_by_frequency() {
        let keywords = keyword_list("zebra apple apple banana banana banana", &[]);
        assert_eq!(keywords, vec!["banana", "apple", "zebra"]);
    }

    #[test]
    fn keyword_list_filters_stop_words_digits_and_short_words() {
        let keywords = keyword_list("the 123 ab project project", &[]);
        assert_eq!(keywords, vec!["project"]);
    }

    #[test]
    fn keyword_list_honors_custom_stop_words() {
        let keywords = keyword_list("readme content content", &["readme"]);
        assert_eq!(keywords, vec!["content"]);
    }

    #[test]
    fn normalize_metadata_coerces_each_type() {
        let mut metadata = Map::new();
        metadata.insert("title".into(), Value::String("Notes".into()));
        metadata.insert("count".into(), Value::Number(3.into()));
        metadata.insert("draft".into(), Value::Bool(true));
        metadata.insert("tags".into(), serde_json::json!(["a", "b"]));
        metadata.insert("nothing".into(), Value::Null);

        let normalized = normalize_metadata(&metadata);
        assert_eq!(normalized.get("title").map(String::as_str), Some("Notes"));
        assert_eq!(normalized.get("count").map(String::as_str), Some("3"));
        assert_eq!(normalized.get("draft").map(String::as_str), Some("true"));
        assert_eq!(normalized.get("tags").map(String::as_str), Some(r#"["a","b"]"#));
        assert!(!normalized.contains_key("nothing"));
    }

    #[test]
    fn registry_selects_markdown_and_falls_back_to_text() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.parser_for(Path::new("/tmp/a.md")).name(), "markdown");
        assert_eq!(registry.parser_for(Path::new("/tmp/a.MARKDOWN")).name(), "markdown");
        assert_eq!(registry.parser_for(Path::new("/tmp/a.txt")).name(), "text");
        assert_eq!(registry.parser_for(Path::new("/tmp/a.unknown")).name(), "text");
        assert_eq!(registry.parser_for(Path::new("/tmp/noext")).name(), "text");
    }

    #[tokio::test]
    async fn parse_file_collects_file_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Title\n\nbody text here").unwrap();

        let registry = ParserRegistry::with_defaults();
        let parsed = registry.parse_file(&path).await.unwrap();
        assert_eq!(parsed.parser_name, "markdown");
        assert_eq!(parsed.file_info.file_name, "doc.md");
        assert_eq!(parsed.file_info.file_extension, ".md");
        assert_eq!(parsed.file_info.file_hash, sha256_hex("# Title\n\nbody text here"));
        assert!(parsed.outcome.keywords.contains(&"title".to_string()));
    }

    #[tokio::test]
    async fn parse_file_missing_is_not_found() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse_file(Path::new("/tmp/definitely-missing-9ff1.md")).await;
        assert!(matches!(err, Err(ToolError::NotFound(_))));
    }
}
