//! Content snippets for search results.

use regex::RegexBuilder;

/// Maximum snippet length in characters, before highlighting markers.
pub const MAX_SNIPPET_LEN: usize = 200;

/// Clamp a byte offset down to the nearest char boundary.
fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Produce a snippet of at most [`MAX_SNIPPET_LEN`] characters centered on
/// the first occurrence of any query term, with every term occurrence
/// wrapped in `**…**` (case-insensitive) and ellipses marking truncated
/// edges.
pub fn generate_snippet(content: &str, terms: &[String]) -> String {
    if content.is_empty() {
        return String::new();
    }

    let content_lower = content.to_lowercase();

    // Center the window on the first term that appears at all.
    let mut start = 0;
    for term in terms {
        if let Some(pos) = content_lower.find(term.as_str()) {
            start = pos.saturating_sub(MAX_SNIPPET_LEN / 2);
            break;
        }
    }
    let start = floor_boundary(content, start);
    let end = floor_boundary(content, start + MAX_SNIPPET_LEN);

    let mut snippet = content[start..end].to_string();
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < content.len() {
        snippet = format!("{snippet}...");
    }

    for term in terms {
        if term.is_empty() {
            continue;
        }
        if let Ok(pattern) =
            RegexBuilder::new(&regex::escape(term)).case_insensitive(true).build()
        {
            snippet = pattern.replace_all(&snippet, format!("**{term}**")).into_owned();
        }
    }

    snippet.trim().to_string()
}
