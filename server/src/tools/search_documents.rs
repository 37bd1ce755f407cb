//! `searchDocuments` — ranked keyword search over the indexed store.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{Tool, ToolFuture, ToolOutput};
use crate::error::ToolError;
use crate::search::{SearchEngine, SearchOptions, SortBy};

pub struct SearchDocumentsTool {
    engine: Arc<SearchEngine>,
    default_limit: usize,
}

impl SearchDocumentsTool {
    pub fn new(engine: Arc<SearchEngine>, default_limit: usize) -> Self {
        Self { engine, default_limit }
    }
}

impl Tool for SearchDocumentsTool {
    fn name(&self) -> &'static str {
        "searchDocuments"
    }

    fn description(&self) -> &'static str {
        "Search indexed documents using keyword matching with relevance ranking. Supports \
         file type filtering, result sorting, and returns document metadata with content \
         snippets. Optimized for sub-200ms response times."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query with keywords to match against document content",
                    "minLength": 1,
                    "maxLength": 500
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": self.default_limit,
                    "minimum": 1,
                    "maximum": 100
                },
                "file_type": {
                    "type": "string",
                    "description": "Filter results by file type",
                    "enum": ["md", "markdown", "txt", "text", ".md", ".txt"]
                },
                "sort_by": {
                    "type": "string",
                    "description": "Sort order for results",
                    "enum": ["relevance", "date", "name"],
                    "default": "relevance"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, params: Map<String, Value>) -> ToolFuture<'a> {
        Box::pin(async move {
            let query =
                params.get("query").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let limit = params
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(self.default_limit);
            let file_type =
                params.get("file_type").and_then(|v| v.as_str()).map(|s| s.to_string());
            let sort_by = params
                .get("sort_by")
                .and_then(|v| v.as_str())
                .and_then(SortBy::parse)
                .unwrap_or(SortBy::Relevance);

            let response =
                self.engine.search(SearchOptions { query, limit, file_type, sort_by }).await?;

            let from_cache = response.from_cache;
            let data = serde_json::to_value(&response)
                .map_err(|e| ToolError::Internal(format!("serialize search response: {e}")))?;

            let mut metadata = Map::new();
            metadata.insert("tool_version".into(), Value::String("1.0".into()));
            metadata.insert(
                "search_method".into(),
                Value::String(if from_cache { "cached" } else { "database" }.into()),
            );
            metadata.insert("cache_hit".into(), Value::Bool(from_cache));
            Ok(ToolOutput::with_metadata(data, metadata))
        })
    }
}
