//! `getDocument` — retrieve one document by id or path, with content
//! formatting and size management.

use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::{Tool, ToolFuture, ToolOutput};
use crate::db::models::{to_rfc3339, Document};
use crate::db::DocumentStore;
use crate::error::ToolError;
use crate::parsers::markdown::strip_markdown;

/// Hard content cap applied even when `max_content_length` is 0.
const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024;
const TRUNCATION_INDICATOR: &str = "\n\n[Content truncated due to size limits]\n";

pub struct GetDocumentTool {
    store: Arc<DocumentStore>,
}

impl GetDocumentTool {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Leading-header or common-marker heuristic for "already markdown".
fn looks_like_markdown(content: &str) -> bool {
    let trimmed = content.trim_start();
    if ["# ", "## ", "### ", "#### ", "##### ", "###### "]
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
    {
        return true;
    }
    ["**", "*", "`", "##", "- ", "1. ", "[", "]("].iter().any(|marker| content.contains(marker))
}

struct FormattedContent {
    content: String,
    length: usize,
    truncated: bool,
}

fn format_content(content: &str, format: &str, max_length: usize) -> FormattedContent {
    if content.is_empty() {
        return FormattedContent { content: String::new(), length: 0, truncated: false };
    }

    let mut truncated = false;
    let mut body = content;
    if max_length > 0 && content.len() > max_length {
        body = &content[..floor_boundary(content, max_length)];
        truncated = true;
    } else if content.len() > MAX_CONTENT_SIZE {
        body = &content[..floor_boundary(content, MAX_CONTENT_SIZE)];
        truncated = true;
    }

    let mut formatted = match format {
        "markdown" => {
            if looks_like_markdown(body) {
                body.to_string()
            } else {
                format!("```\n{body}\n```")
            }
        }
        "text" => strip_markdown(body),
        // json returns the body as-is; escaping happens at serialization.
        _ => body.to_string(),
    };
    if truncated {
        formatted.push_str(TRUNCATION_INDICATOR);
    }

    FormattedContent { length: formatted.chars().count(), content: formatted, truncated }
}

fn format_file_size(size: i64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

fn file_stats(document: &Document) -> Value {
    let mut stats = json!({
        "size_bytes": document.file_size,
        "size_readable": format_file_size(document.file_size),
        "extension": Path::new(&document.file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default(),
        "created_at": document.created_at.map(to_rfc3339),
        "modified_at": document.modified_at.map(to_rfc3339),
        "indexed_at": document.indexed_at.map(to_rfc3339),
    });

    if !document.content.is_empty() {
        stats["content_statistics"] = json!({
            "lines": document.content.lines().count(),
            "words": document.content.split_whitespace().count(),
            "characters": document.content.chars().count(),
            "characters_no_spaces": document.content.chars().filter(|c| *c != ' ').count(),
        });
    }
    stats
}

impl Tool for GetDocumentTool {
    fn name(&self) -> &'static str {
        "getDocument"
    }

    fn description(&self) -> &'static str {
        "Retrieve a specific document by ID or file path with support for multiple output \
         formats (json, markdown, text) and optional metadata inclusion. Optimized for \
         sub-200ms retrieval times with content size management."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": {
                    "type": "integer",
                    "description": "Database document ID to retrieve",
                    "minimum": 1
                },
                "file_path": {
                    "type": "string",
                    "description": "File path of document to retrieve",
                    "minLength": 1,
                    "maxLength": 1000
                },
                "include_content": {
                    "type": "boolean",
                    "description": "Include full document content in response",
                    "default": true
                },
                "format": {
                    "type": "string",
                    "description": "Output format for document content",
                    "enum": ["json", "markdown", "text"],
                    "default": "json"
                },
                "include_metadata": {
                    "type": "boolean",
                    "description": "Include document metadata in response",
                    "default": true
                },
                "max_content_length": {
                    "type": "integer",
                    "description": "Maximum content length to return (0 for no limit)",
                    "default": 0,
                    "minimum": 0,
                    "maximum": 10485760
                }
            },
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, params: Map<String, Value>) -> ToolFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();

            let document_id = params.get("document_id").and_then(|v| v.as_i64());
            let file_path = params.get("file_path").and_then(|v| v.as_str());
            let include_content =
                params.get("include_content").and_then(|v| v.as_bool()).unwrap_or(true);
            let format = params.get("format").and_then(|v| v.as_str()).unwrap_or("json");
            let include_metadata =
                params.get("include_metadata").and_then(|v| v.as_bool()).unwrap_or(true);
            let max_content_length = params
                .get("max_content_length")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(0);

            if document_id.is_none() && file_path.is_none() {
                return Err(ToolError::Validation(
                    "Either 'document_id' or 'file_path' parameter is required".to_string(),
                ));
            }
            if document_id.is_some() && file_path.is_some() {
                return Err(ToolError::Validation(
                    "Only one of 'document_id' or 'file_path' should be provided".to_string(),
                ));
            }

            let (document, retrieval_method) = match document_id {
                Some(id) => {
                    let doc = self.store.get_by_id(id).await?.ok_or_else(|| {
                        ToolError::NotFound(format!("Document with ID {id} not found"))
                    })?;
                    (doc, "by_id")
                }
                None => {
                    let path = file_path.unwrap_or_default();
                    let doc = self.store.get_by_path(path).await?.ok_or_else(|| {
                        ToolError::NotFound(format!("Document with path '{path}' not found"))
                    })?;
                    (doc, "by_path")
                }
            };
            let id = document
                .id
                .ok_or_else(|| ToolError::Internal("document without id".to_string()))?;

            let mut response = Map::new();
            response.insert("document_id".into(), json!(id));
            response.insert("file_path".into(), json!(document.file_path));
            response.insert("file_name".into(), json!(document.file_name));
            response.insert("file_type".into(), json!(document.file_type));
            response.insert("file_size_bytes".into(), json!(document.file_size));
            response.insert("file_hash".into(), json!(document.file_hash));
            response.insert("created_at".into(), json!(document.created_at.map(to_rfc3339)));
            response.insert("modified_at".into(), json!(document.modified_at.map(to_rfc3339)));
            response.insert("indexed_at".into(), json!(document.indexed_at.map(to_rfc3339)));

            if include_content {
                let formatted = format_content(&document.content, format, max_content_length);
                response.insert("content".into(), Value::String(formatted.content));
                response.insert("content_length".into(), json!(formatted.length));
                response.insert("content_truncated".into(), Value::Bool(formatted.truncated));
                response.insert("content_format".into(), json!(format));
            }

            if include_metadata {
                let metadata = self.store.get_metadata(id).await?;
                response.insert("metadata".into(), json!(metadata));
                response.insert(
                    "parsed_metadata".into(),
                    Value::Object(document.parsed_metadata()),
                );
            }

            response.insert("file_stats".into(), file_stats(&document));

            let retrieval_time_ms =
                (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
            response.insert("retrieval_time_ms".into(), json!(retrieval_time_ms));
            response.insert("retrieval_method".into(), json!(retrieval_method));

            info!(
                document_id = id,
                path = %document.file_path,
                method = retrieval_method,
                time_ms = retrieval_time_ms,
                "Document retrieved"
            );

            let mut metadata = Map::new();
            metadata.insert("tool_version".into(), Value::String("1.0".into()));
            metadata.insert("retrieval_method".into(), json!(retrieval_method));
            metadata.insert("document_id".into(), json!(id));
            metadata.insert("file_size_bytes".into(), json!(document.file_size));
            Ok(ToolOutput::with_metadata(Value::Object(response), metadata))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_format_returns_body_as_is() {
        let formatted = format_content("# Title\n\nbody", "json", 0);
        assert_eq!(formatted.content, "# Title\n\nbody");
        assert!(!formatted.truncated);
    }

    #[test]
    fn markdown_format_wraps_plain_text_in_fence() {
        let formatted = format_content("just plain words without markers", "markdown", 0);
        assert!(formatted.content.starts_with("```\n"));
        assert!(formatted.content.ends_with("\n```"));

        let formatted = format_content("# Already markdown", "markdown", 0);
        assert_eq!(formatted.content, "# Already markdown");
    }

    #[test]
    fn text_format_strips_markers() {
        let formatted = format_content("# Title\n\n**bold** and [link](https://x)", "text", 0);
        assert!(!formatted.content.contains('#'));
        assert!(!formatted.content.contains("**"));
        assert!(formatted.content.contains("Title"));
        assert!(formatted.content.contains("link"));
    }

    #[test]
    fn explicit_limit_appends_sentinel() {
        let body = "a".repeat(100);
        let formatted = format_content(&body, "json", 10);
        assert!(formatted.truncated);
        assert!(formatted.content.starts_with("aaaaaaaaaa"));
        assert!(formatted.content.ends_with(TRUNCATION_INDICATOR));
    }

    #[test]
    fn zero_limit_means_unlimited_below_hard_cap() {
        let body = "b".repeat(4096);
        let formatted = format_content(&body, "json", 0);
        assert!(!formatted.truncated);
        assert_eq!(formatted.length, 4096);
    }

    #[test]
    fn readable_sizes() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}
