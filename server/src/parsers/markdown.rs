//! Markdown parser: frontmatter, structure, links, code blocks, and a
//! markup-stripped body for indexing.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::OnceLock;

use super::{keyword_list, DocumentParser, ParseOutcome};
use crate::error::ToolError;
use crate::search::tokenize::STOP_WORDS;

/// Stop words specific to markdown prose, on top of the shared list.
const MARKDOWN_STOP_WORDS: &[&str] = &[
    "markdown", "md", "readme", "doc", "docs", "note", "notes", "todo", "fixme", "hack", "xxx",
    "img", "image", "link", "href", "url", "http", "https", "www", "com", "org", "net",
];

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect(concat!("regex ", stringify!($name))))
        }
    };
}

cached_regex!(frontmatter_re, r"\A---\n((?s).*?)\n---\n");
cached_regex!(header_re, r"(?m)^(#{1,6})\s+(.+)$");
cached_regex!(link_re, r"\[([^\]]+)\]\(([^)]+)\)");
cached_regex!(image_re, r"!\[([^\]]*)\]\(([^)]+)\)");
cached_regex!(code_block_re, r"```(\w*)\n((?s).*?)\n```");
cached_regex!(inline_code_re, r"`([^`]+)`");
cached_regex!(list_item_re, r"(?m)^\s*[-*+]\s+(.+)$");
cached_regex!(numbered_list_re, r"(?m)^\s*\d+\.\s+(.+)$");
cached_regex!(blockquote_re, r"(?m)^>\s+(.+)$");
cached_regex!(table_row_re, r"(?m)^\|(.+)\|$");
cached_regex!(table_rule_re, r"(?m)^\s*[-:| ]+\s*$");
cached_regex!(bold_star_re, r"\*\*([^*]+)\*\*");
cached_regex!(italic_star_re, r"\*([^*]+)\*");
cached_regex!(bold_under_re, r"__([^_]+)__");
cached_regex!(italic_under_re, r"_([^_]+)_");
cached_regex!(strike_re, r"~~([^~]+)~~");
cached_regex!(word_re, r"\b[a-zA-Z0-9_]+\b");
cached_regex!(blank_runs_re, r"\n{3,}");
cached_regex!(spaces_re, r"[ \t]+");

pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    /// Split YAML frontmatter off the document head. Returns the metadata
    /// recovered from it and the remaining body.
    fn extract_frontmatter<'a>(&self, content: &'a str) -> (Map<String, Value>, &'a str) {
        let mut metadata = Map::new();
        let Some(m) = frontmatter_re().captures(content) else {
            return (metadata, content);
        };
        let yaml_body = m.get(1).map(|g| g.as_str()).unwrap_or_default();
        let rest = &content[m.get(0).map(|g| g.end()).unwrap_or(0)..];

        match serde_yaml::from_str::<serde_yaml::Value>(yaml_body) {
            Ok(value) => match serde_json::to_value(&value) {
                Ok(Value::Object(map)) => {
                    metadata = map;
                    metadata.insert("has_frontmatter".into(), Value::Bool(true));
                }
                _ => {
                    // Scalar or sequence frontmatter carries no usable keys.
                }
            },
            Err(e) => {
                metadata.insert("frontmatter_error".into(), Value::String(e.to_string()));
            }
        }
        (metadata, rest)
    }

    fn extract_structure(&self, content: &str) -> Map<String, Value> {
        let mut structure = Map::new();

        let headers: Vec<Value> = header_re()
            .captures_iter(content)
            .map(|c| {
                let level = c.get(1).map(|g| g.as_str().len()).unwrap_or(1);
                let text = c.get(2).map(|g| g.as_str().trim()).unwrap_or_default();
                json!({ "level": level, "text": text, "anchor": anchor_for(text) })
            })
            .collect();
        if !headers.is_empty() {
            let max_level =
                headers.iter().filter_map(|h| h["level"].as_u64()).max().unwrap_or(1);
            structure.insert("title".into(), headers[0]["text"].clone());
            structure.insert("header_count".into(), json!(headers.len()));
            structure.insert("max_header_level".into(), json!(max_level));
            structure.insert("headers".into(), Value::Array(headers));
        }

        let unordered = list_item_re().captures_iter(content).count();
        let ordered = numbered_list_re().captures_iter(content).count();
        if unordered + ordered > 0 {
            structure.insert("list_item_count".into(), json!(unordered + ordered));
        }

        let blockquotes: Vec<Value> = blockquote_re()
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|g| Value::String(g.as_str().trim().to_string()))
            .collect();
        if !blockquotes.is_empty() {
            structure.insert("blockquote_count".into(), json!(blockquotes.len()));
            structure.insert("blockquotes".into(), Value::Array(blockquotes));
        }

        let table_rows = table_row_re().find_iter(content).count();
        if table_rows > 0 {
            structure.insert("table_row_count".into(), json!(table_rows));
            structure.insert("has_tables".into(), Value::Bool(true));
        }

        structure
    }

    fn extract_links(&self, content: &str) -> Map<String, Value> {
        let mut data = Map::new();

        // Mask image syntax so links and images don't double-count.
        let without_images = image_re().replace_all(content, "");
        let links: Vec<Value> = link_re()
            .captures_iter(&without_images)
            .map(|c| {
                let text = c.get(1).map(|g| g.as_str().trim()).unwrap_or_default();
                let url = c.get(2).map(|g| g.as_str().trim()).unwrap_or_default();
                let kind = if url.starts_with("http://") || url.starts_with("https://") {
                    "external"
                } else {
                    "internal"
                };
                json!({ "text": text, "url": url, "type": kind })
            })
            .collect();
        if !links.is_empty() {
            let external =
                links.iter().filter(|l| l["type"].as_str() == Some("external")).count();
            data.insert("link_count".into(), json!(links.len()));
            data.insert("external_link_count".into(), json!(external));
            data.insert("internal_link_count".into(), json!(links.len() - external));
            data.insert("links".into(), Value::Array(links));
        }

        let images: Vec<Value> = image_re()
            .captures_iter(content)
            .map(|c| {
                json!({
                    "alt_text": c.get(1).map(|g| g.as_str().trim()).unwrap_or_default(),
                    "url": c.get(2).map(|g| g.as_str().trim()).unwrap_or_default(),
                })
            })
            .collect();
        if !images.is_empty() {
            data.insert("image_count".into(), json!(images.len()));
            data.insert("images".into(), Value::Array(images));
        }

        data
    }

    fn extract_markdown_metadata(
        &self,
        content: &str,
        file_path: Option<&str>,
    ) -> Map<String, Value> {
        let mut metadata = Map::new();

        let code_blocks: Vec<Value> = code_block_re()
            .captures_iter(content)
            .map(|c| {
                let language = c.get(1).map(|g| g.as_str().trim()).unwrap_or_default();
                let language = if language.is_empty() { "text" } else { language };
                let body = c.get(2).map(|g| g.as_str().trim()).unwrap_or_default();
                let line_count = if body.is_empty() { 0 } else { body.lines().count() };
                json!({ "language": language, "line_count": line_count })
            })
            .collect();
        if !code_blocks.is_empty() {
            let mut languages: Vec<&str> =
                code_blocks.iter().filter_map(|b| b["language"].as_str()).collect();
            languages.sort_unstable();
            languages.dedup();
            metadata.insert("code_block_count".into(), json!(code_blocks.len()));
            metadata.insert("code_languages".into(), json!(languages));
            metadata.insert("code_blocks".into(), Value::Array(code_blocks));
        }

        let inline_code = inline_code_re().find_iter(content).count();
        if inline_code > 0 {
            metadata.insert("inline_code_count".into(), json!(inline_code));
            metadata.insert("has_inline_code".into(), Value::Bool(true));
        }

        let lines = content.lines().count();
        let paragraphs = content
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .count();
        metadata.insert("line_count".into(), json!(lines));
        metadata.insert("paragraph_count".into(), json!(paragraphs));
        metadata.insert("character_count".into(), json!(content.chars().count()));
        metadata.insert("word_count".into(), json!(content.split_whitespace().count()));
        metadata.insert("markdown_type".into(), Value::String("markdown".into()));

        if let Some(path) = file_path {
            let stem = Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();
            let document_type = if stem.contains("readme") {
                "readme"
            } else if stem.contains("changelog") || stem.contains("change") {
                "changelog"
            } else if stem.contains("todo") {
                "todo"
            } else {
                "document"
            };
            metadata.insert("document_type".into(), Value::String(document_type.into()));
        }

        metadata
    }

    /// Keywords recovered from structural elements: header words, link
    /// texts, and fenced-block language tags.
    fn structure_keywords(&self, content: &str) -> Vec<String> {
        let mut keywords = Vec::new();
        for c in header_re().captures_iter(content) {
            if let Some(text) = c.get(2) {
                collect_words(text.as_str(), &mut keywords);
            }
        }
        for c in link_re().captures_iter(content) {
            if let Some(text) = c.get(1) {
                collect_words(text.as_str(), &mut keywords);
            }
        }
        for c in code_block_re().captures_iter(content) {
            if let Some(lang) = c.get(1) {
                let lang = lang.as_str().trim().to_lowercase();
                if !lang.is_empty() {
                    keywords.push(lang);
                }
            }
        }
        keywords
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_words(text: &str, into: &mut Vec<String>) {
    let lowered = text.to_lowercase();
    for m in word_re().find_iter(&lowered) {
        let word = m.as_str();
        if word.len() >= 3 && !STOP_WORDS.contains(&word) {
            into.push(word.to_string());
        }
    }
}

/// GitHub-style anchor for a header text.
fn anchor_for(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String =
        lowered.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_').collect();
    let mut anchor = String::with_capacity(cleaned.len());
    let mut last_dash = false;
    for c in cleaned.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !last_dash && !anchor.is_empty() {
                anchor.push('-');
                last_dash = true;
            }
        } else {
            anchor.push(c);
            last_dash = false;
        }
    }
    anchor.trim_end_matches('-').to_string()
}

/// Strip markdown markers while preserving the underlying text. This is the
/// canonical transform shared with `getDocument`'s `text` output format.
pub fn strip_markdown(content: &str) -> String {
    let stripped = code_block_re().replace_all(content, "${2}");
    let stripped = inline_code_re().replace_all(&stripped, "${1}");
    let stripped = image_re().replace_all(&stripped, "${1}");
    let stripped = link_re().replace_all(&stripped, "${1}");
    let stripped = header_re().replace_all(&stripped, "${2}");
    let stripped = blockquote_re().replace_all(&stripped, "${1}");
    let stripped = list_item_re().replace_all(&stripped, "${1}");
    let stripped = numbered_list_re().replace_all(&stripped, "${1}");
    let stripped = stripped.replace('|', " ");
    let stripped = table_rule_re().replace_all(&stripped, "");
    let stripped = bold_star_re().replace_all(&stripped, "${1}");
    let stripped = italic_star_re().replace_all(&stripped, "${1}");
    let stripped = bold_under_re().replace_all(&stripped, "${1}");
    let stripped = italic_under_re().replace_all(&stripped, "${1}");
    let stripped = strike_re().replace_all(&stripped, "${1}");
    let stripped = blank_runs_re().replace_all(&stripped, "\n\n");
    let stripped = spaces_re().replace_all(&stripped, " ");
    stripped.trim().to_string()
}

impl DocumentParser for MarkdownParser {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".md", ".markdown", ".mdown", ".mkd", ".mkdn"]
    }

    fn parse(&self, content: &str, file_path: Option<&str>) -> Result<ParseOutcome, ToolError> {
        if content.is_empty() {
            return Err(ToolError::ParseFailed("Empty content provided".to_string()));
        }

        let mut outcome = ParseOutcome::default();

        let (frontmatter, body) = self.extract_frontmatter(content);
        outcome.metadata.extend(frontmatter);
        outcome.metadata.extend(self.extract_structure(body));
        outcome.metadata.extend(self.extract_links(body));
        outcome.metadata.extend(self.extract_markdown_metadata(body, file_path));

        outcome.content = strip_markdown(body);

        let mut keywords = keyword_list(&outcome.content, MARKDOWN_STOP_WORDS);
        keywords.extend(self.structure_keywords(body));
        // Dedup preserving rank order.
        let mut seen = std::collections::HashSet::new();
        keywords.retain(|k| seen.insert(k.clone()));
        outcome.keywords = keywords;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_lands_in_metadata_and_is_removed_from_body() {
        let doc = "---\ntitle: Project Notes\ntags:\n  - rust\n  - search\n---\n# Heading\n\nbody";
        let parser = MarkdownParser::new();
        let outcome = parser.parse(doc, Some("/notes/plan.md")).unwrap();

        assert_eq!(outcome.metadata["title"], Value::String("Project Notes".into()));
        assert_eq!(outcome.metadata["has_frontmatter"], Value::Bool(true));
        assert_eq!(outcome.metadata["tags"], serde_json::json!(["rust", "search"]));
        assert!(!outcome.content.contains("title: Project Notes"));
        assert!(outcome.content.contains("Heading"));
    }

    #[test]
    fn malformed_frontmatter_reports_error_and_keeps_body() {
        let doc = "---\nkey: [unclosed\n---\nbody text";
        let parser = MarkdownParser::new();
        let outcome = parser.parse(doc, None).unwrap();
        assert!(outcome.metadata.contains_key("frontmatter_error"));
        assert!(outcome.content.contains("body text"));
    }

    #[test]
    fn headers_produce_title_hierarchy_and_anchors() {
        let doc = "# Getting Started\n\n## Install Steps\n\ntext";
        let parser = MarkdownParser::new();
        let outcome = parser.parse(doc, None).unwrap();
        assert_eq!(outcome.metadata["title"], Value::String("Getting Started".into()));
        assert_eq!(outcome.metadata["header_count"], serde_json::json!(2));
        assert_eq!(outcome.metadata["max_header_level"], serde_json::json!(2));
        let headers = outcome.metadata["headers"].as_array().unwrap();
        assert_eq!(headers[1]["anchor"], Value::String("install-steps".into()));
    }

    #[test]
    fn links_and_images_split_internal_external() {
        let doc = "[docs](https://example.com/docs) and [local](./other.md)\n\n![logo](img/logo.png)";
        let parser = MarkdownParser::new();
        let outcome = parser.parse(doc, None).unwrap();
        assert_eq!(outcome.metadata["link_count"], serde_json::json!(2));
        assert_eq!(outcome.metadata["external_link_count"], serde_json::json!(1));
        assert_eq!(outcome.metadata["internal_link_count"], serde_json::json!(1));
        assert_eq!(outcome.metadata["image_count"], serde_json::json!(1));
    }

    #[test]
    fn code_blocks_capture_language_tags() {
        let doc = "```rust\nfn main() {}\n```\n\ntext with `inline` code\n\n```\nplain\n```";
        let parser = MarkdownParser::new();
        let outcome = parser.parse(doc, None).unwrap();
        assert_eq!(outcome.metadata["code_block_count"], serde_json::json!(2));
        let languages = outcome.metadata["code_languages"].as_array().unwrap();
        assert!(languages.contains(&Value::String("rust".into())));
        assert!(languages.contains(&Value::String("text".into())));
        assert_eq!(outcome.metadata["inline_code_count"], serde_json::json!(1));
        // Language tag surfaces as a keyword.
        assert!(outcome.keywords.contains(&"rust".to_string()));
    }

    #[test]
    fn strip_markdown_removes_markers_keeps_text() {
        let doc = "# Title\n\nSome **bold** and *italic* text with [a link](https://x.y) and `code`.\n\n- item one\n1. item two\n\n> quoted line";
        let stripped = strip_markdown(doc);
        assert!(!stripped.contains('#'));
        assert!(!stripped.contains("**"));
        assert!(!stripped.contains('['));
        assert!(!stripped.contains('`'));
        assert!(!stripped.contains("- item"));
        assert!(!stripped.contains("> "));
        for fragment in ["Title", "bold", "italic", "a link", "code", "item one", "item two", "quoted line"] {
            assert!(stripped.contains(fragment), "missing {fragment:?} in {stripped:?}");
        }
    }

    #[test]
    fn strip_markdown_preserves_fence_bodies() {
        let doc = "before\n\n```rust\nlet x = 1;\n```\n\nafter";
        let stripped = strip_markdown(doc);
        assert!(stripped.contains("let x = 1;"));
        assert!(!stripped.contains("```"));
        assert!(!stripped.contains("rust\n"));
    }

    #[test]
    fn empty_content_is_a_parse_failure() {
        let parser = MarkdownParser::new();
        assert!(matches!(parser.parse("", None), Err(ToolError::ParseFailed(_))));
    }

    #[test]
    fn readme_stem_sets_document_type() {
        let parser = MarkdownParser::new();
        let outcome = parser.parse("# X", Some("/repo/README.md")).unwrap();
        assert_eq!(outcome.metadata["document_type"], Value::String("readme".into()));
    }
}
