//! Keyword extraction and query normalization.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Common English function words dropped at index time.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "this", "that", "these", "those", "a", "an", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should",
    "may", "might", "can", "shall", "not", "now", "all", "any", "each", "its", "our", "your",
    "their", "such",
];

/// Short terms that survive query normalization despite their length.
pub const SHORT_TERMS: &[&str] = &["c", "r", "go", "js", "ai", "ml", "ui", "ux"];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("word regex"))
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Tokenize `content` into indexable keywords with their token positions.
///
/// Positions index into the full matched-token stream, so stop words still
/// advance the counter even though they produce no entry.
pub fn extract_keywords(content: &str) -> HashMap<String, Vec<usize>> {
    let lowered = content.to_lowercase();
    let mut keywords: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, m) in word_regex().find_iter(&lowered).enumerate() {
        let word = m.as_str();
        if is_stop_word(word) {
            continue;
        }
        keywords.entry(word.to_string()).or_default().push(position);
    }
    keywords
}

/// Word count used as the TF denominator at ingest.
pub fn total_words(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Normalize a search query into terms: collapse whitespace, lowercase,
/// drop terms shorter than two characters unless whitelisted.
pub fn normalize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|term| term.len() >= 2 || SHORT_TERMS.contains(term))
        .map(|term| term.to_string())
        .collect()
}
