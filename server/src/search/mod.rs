//! Search: ingest-time keyword extraction, query scoring and snippets.

pub mod engine;
pub mod snippet;
pub mod tokenize;

pub use engine::{SearchEngine, SearchOptions, SearchResponse, SortBy};
