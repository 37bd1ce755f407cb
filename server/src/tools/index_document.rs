//! `indexDocument` — parse a file and write it into the searchable store.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{Tool, ToolFuture, ToolOutput};
use crate::config::ServerConfig;
use crate::db::models::{to_rfc3339, Document, IndexEntry};
use crate::db::DocumentStore;
use crate::error::ToolError;
use crate::parsers::{normalize_metadata, ParsedFile, ParserRegistry};
use crate::search::tokenize::{extract_keywords, total_words};

pub struct IndexDocumentTool {
    store: Arc<DocumentStore>,
    parsers: Arc<ParserRegistry>,
    config: ServerConfig,
}

impl IndexDocumentTool {
    pub fn new(store: Arc<DocumentStore>, parsers: Arc<ParserRegistry>, config: ServerConfig) -> Self {
        Self { store, parsers, config }
    }

    fn supported_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                self.config.supported_extensions.contains(&format!(".{}", ext.to_lowercase()))
            }
            None => false,
        }
    }

    /// Filesystem facts plus parser output, merged into the metadata bag
    /// persisted with the document. Parser keys are prefixed to avoid
    /// colliding with the filesystem ones.
    fn combine_metadata(&self, parsed: &ParsedFile) -> Map<String, Value> {
        let info = &parsed.file_info;
        let mut combined = Map::new();
        combined.insert("file_name".into(), Value::String(info.file_name.clone()));
        combined.insert("file_extension".into(), Value::String(info.file_extension.clone()));
        combined.insert("file_size_bytes".into(), json!(info.file_size));
        if let Some(created) = info.created_at {
            combined.insert("file_created".into(), Value::String(to_rfc3339(created)));
        }
        if let Some(modified) = info.modified_at {
            combined.insert("file_modified".into(), Value::String(to_rfc3339(modified)));
        }
        combined.insert("absolute_path".into(), Value::String(info.file_path.clone()));

        for (key, value) in &parsed.outcome.metadata {
            let parser_key = if combined.contains_key(&format!("parser_{key}")) {
                format!("parsed_{key}")
            } else {
                format!("parser_{key}")
            };
            combined.insert(parser_key, value.clone());
        }

        if !parsed.outcome.keywords.is_empty() {
            combined.insert(
                "extracted_keywords".into(),
                Value::String(parsed.outcome.keywords.join(", ")),
            );
            combined
                .insert("keyword_count".into(), Value::String(parsed.outcome.keywords.len().to_string()));
        }
        combined.insert(
            "parsing_duration_ms".into(),
            Value::String(format!("{:.2}", parsed.parse_time_ms)),
        );
        combined.insert("parser_type".into(), Value::String(parsed.parser_name.to_string()));
        combined.insert("content_hash".into(), Value::String(info.file_hash.clone()));
        combined
    }
}

impl Tool for IndexDocumentTool {
    fn name(&self) -> &'static str {
        "indexDocument"
    }

    fn description(&self) -> &'static str {
        "Index a document file (.md or .txt) for search and retrieval. Parses content, \
         extracts metadata, and stores in the document database. Supports force reindexing \
         and automatic duplicate detection."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Full path to the document file to index",
                    "minLength": 1,
                    "maxLength": 1000
                },
                "force_reindex": {
                    "type": "boolean",
                    "description": "Force reindexing even if document is already indexed and up to date",
                    "default": false
                }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, params: Map<String, Value>) -> ToolFuture<'a> {
        Box::pin(async move {
            let file_path =
                params.get("file_path").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let force_reindex =
                params.get("force_reindex").and_then(|v| v.as_bool()).unwrap_or(false);
            let path = Path::new(&file_path);

            let fs_meta = tokio::fs::metadata(path)
                .await
                .map_err(|_| ToolError::NotFound(format!("File not found: {file_path}")))?;
            if !fs_meta.is_file() {
                return Err(ToolError::Validation(format!("Path is not a file: {file_path}")));
            }
            if !self.supported_extension(path) {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                let mut supported: Vec<&str> =
                    self.config.supported_extensions.iter().map(String::as_str).collect();
                supported.sort_unstable();
                return Err(ToolError::UnsupportedType(format!(
                    "{ext}. Supported types: {}",
                    supported.join(", ")
                )));
            }
            if fs_meta.len() > self.config.max_document_size {
                return Err(ToolError::TooLarge(format!(
                    "{} bytes. Maximum size: {} bytes",
                    fs_meta.len(),
                    self.config.max_document_size
                )));
            }

            let existing = self.store.get_by_path(&file_path).await?;

            if let Some(existing_doc) = &existing {
                if !force_reindex {
                    let file_mtime = fs_meta.modified().ok().map(DateTime::<Utc>::from);
                    // Stored timestamps carry second precision; compare at
                    // the same granularity so an unchanged file never looks
                    // newer than its own record.
                    let up_to_date = match (file_mtime, existing_doc.modified_at) {
                        (Some(mtime), Some(stored)) => mtime.timestamp() <= stored.timestamp(),
                        _ => false,
                    };
                    if up_to_date {
                        let data = json!({
                            "status": "already_indexed",
                            "document_id": existing_doc.id,
                            "message": "Document is already indexed and up to date",
                            "indexed_at": existing_doc.indexed_at.map(to_rfc3339),
                            "file_path": file_path,
                        });
                        return Ok(ToolOutput::new(data));
                    }
                }
            }

            let parsed = self.parsers.parse_file(path).await?;
            if parsed.outcome.content.trim().is_empty() {
                return Err(ToolError::EmptyContent);
            }

            let combined = self.combine_metadata(&parsed);
            let now = Utc::now();

            let mut document = Document::from_content(&file_path, parsed.outcome.content.clone());
            document.created_at = parsed.file_info.created_at.or(Some(now));
            document.modified_at = parsed.file_info.modified_at.or(Some(now));
            document.indexed_at = Some(now);
            document.metadata_json = serde_json::to_string(&combined)
                .map_err(|e| ToolError::Internal(format!("serialize metadata: {e}")))?;

            let word_total = total_words(&parsed.outcome.content);
            let mut entries: Vec<IndexEntry> = extract_keywords(&parsed.outcome.content)
                .into_iter()
                .map(|(keyword, positions)| IndexEntry::new(0, keyword, positions))
                .collect();
            for entry in entries.iter_mut() {
                entry.compute_relevance(word_total);
            }
            let keywords_indexed = entries.len();

            let row_metadata = normalize_metadata(&combined);
            let metadata_fields = row_metadata.len();
            let outcome = self.store.index_document(document, row_metadata, entries).await?;

            let status = if outcome.existed { "reindexed" } else { "indexed" };
            info!(
                file = %file_path,
                document_id = outcome.document_id,
                status,
                keywords = keywords_indexed,
                "Indexed document"
            );

            let data = json!({
                "status": status,
                "document_id": outcome.document_id,
                "file_path": file_path,
                "file_size_bytes": fs_meta.len(),
                "content_length": parsed.outcome.content.chars().count(),
                "indexed_at": to_rfc3339(now),
                "metadata_fields_extracted": metadata_fields,
                "keywords_extracted": parsed.outcome.keywords.len(),
            });
            let mut metadata = Map::new();
            metadata.insert("tool_version".into(), Value::String("1.0".into()));
            metadata.insert("parser_type".into(), Value::String(parsed.parser_name.to_string()));
            metadata.insert("force_reindex".into(), Value::Bool(force_reindex));
            Ok(ToolOutput::with_metadata(data, metadata))
        })
    }
}
