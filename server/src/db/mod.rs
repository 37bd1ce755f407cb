//! Persistent storage: connection pool, schema sequencer, models and the
//! transactional document store.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use models::{CacheEntry, Document, IndexEntry, MetadataMap};
pub use pool::ConnectionPool;
pub use store::{DocumentOrder, DocumentStore, IngestOutcome, StoreStatistics};
