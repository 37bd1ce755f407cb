//! Shared server state wired by the orchestrator at startup.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::db::{ConnectionPool, DocumentStore};
use crate::parsers::ParserRegistry;
use crate::search::SearchEngine;
use crate::tools::get_document::GetDocumentTool;
use crate::tools::index_document::IndexDocumentTool;
use crate::tools::search_documents::SearchDocumentsTool;
use crate::tools::ToolRegistry;

/// Everything a request needs: the store, the parser registry, the search
/// engine and the tool table. Built once at startup and passed explicitly
/// to consumers; no module-level state.
pub struct ServerState {
    pub config: ServerConfig,
    pub pool: Arc<ConnectionPool>,
    pub store: Arc<DocumentStore>,
    pub parsers: Arc<ParserRegistry>,
    pub engine: Arc<SearchEngine>,
    pub tools: Arc<ToolRegistry>,
    /// Kept separately so the watcher can drive ingests directly.
    pub index_tool: Arc<IndexDocumentTool>,
}

impl ServerState {
    /// Open the store, run pending migrations and assemble the tool table.
    pub async fn initialize(config: ServerConfig) -> Result<Self, String> {
        let db_path = config.database_path()?;
        let pool = Arc::new(ConnectionPool::new(config.max_connections));
        let store = Arc::new(DocumentStore::new(Arc::clone(&pool), db_path));

        let schema_version =
            store.initialize().await.map_err(|e| format!("schema migration failed: {e}"))?;
        tracing::info!(schema_version, "Document store ready");

        let parsers = Arc::new(ParserRegistry::with_defaults());
        let engine = Arc::new(SearchEngine::new(
            Arc::clone(&store),
            config.enable_search_caching,
            Duration::from_secs(config.search_cache_ttl_secs),
        ));

        let index_tool = Arc::new(IndexDocumentTool::new(
            Arc::clone(&store),
            Arc::clone(&parsers),
            config.clone(),
        ));
        let mut tools = ToolRegistry::new(Duration::from_secs(config.request_timeout_secs));
        tools.register(Arc::clone(&index_tool) as Arc<dyn crate::tools::Tool>);
        tools.register(Arc::new(SearchDocumentsTool::new(
            Arc::clone(&engine),
            config.default_search_limit,
        )));
        tools.register(Arc::new(GetDocumentTool::new(Arc::clone(&store))));

        Ok(Self {
            config,
            pool,
            store,
            parsers,
            engine,
            tools: Arc::new(tools),
            index_tool,
        })
    }

    /// Release pooled connections. Called last during shutdown.
    pub fn close(&self) {
        self.pool.close();
    }
}
