//! Error types for the store layer and the tool surface.
//!
//! The store raises [`StoreError`]; the tool layer maps everything into
//! [`ToolError`] and from there into the response envelope without changing
//! the error's identity. Watcher dispatch errors never reach the host.

use thiserror::Error;

/// Fatal store errors. Everything that goes wrong below the tool layer maps
/// to one of these three.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Client-visible tool failures, one variant per taxonomy entry.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Duplicate document: {0}")]
    Duplicate(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {0}")]
    TooLarge(String),

    #[error("Failed to parse document: {0}")]
    ParseFailed(String),

    #[error("Document appears to be empty or contains no readable content")]
    EmptyContent,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Tool execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Single-line message for the response envelope.
    pub fn envelope_message(&self) -> String {
        let msg = self.to_string();
        match msg.split_once('\n') {
            Some((first, _)) => first.to_string(),
            None => msg,
        }
    }
}
