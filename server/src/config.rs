//! Server and watcher configuration.
//!
//! Configuration is loaded in layers: built-in defaults, then a `.env` file
//! if present, then `MYDOCS_MCP_*` / `MYDOCS_WATCH_*` environment variables.
//! CLI flags override on top (applied in `main.rs`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default per-tool execution timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Ceiling on concurrent store callers (connection pool permits).
    pub max_connections: usize,
    /// Per-tool execution deadline, seconds.
    pub request_timeout_secs: u64,
    /// `sqlite:///path/to/file.db` form.
    pub database_url: String,
    pub document_root: PathBuf,
    /// Maximum document size in bytes accepted for indexing.
    pub max_document_size: u64,
    /// Extensions accepted by `indexDocument`, with leading dot, lowercase.
    pub supported_extensions: HashSet<String>,
    pub max_search_results: usize,
    pub default_search_limit: usize,
    pub enable_search_caching: bool,
    /// Query-cache TTL in seconds.
    pub search_cache_ttl_secs: u64,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            log_level: "INFO".to_string(),
            log_file: None,
            max_connections: 10,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            database_url: "sqlite:///data/mydocs.db".to_string(),
            document_root: PathBuf::from("./data/documents"),
            max_document_size: 10 * 1024 * 1024,
            supported_extensions: [".md", ".markdown", ".txt", ".text"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_search_results: 100,
            default_search_limit: 10,
            enable_search_caching: true,
            search_cache_ttl_secs: 30 * 60,
            debug: false,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl ServerConfig {
    /// Load configuration from the environment. A `.env` file in the current
    /// directory is read first when present; real environment variables win.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(v) = env_string("MYDOCS_MCP_TRANSPORT") {
            config.transport = v;
        }
        if let Some(v) = env_string("MYDOCS_MCP_LOG_LEVEL") {
            config.log_level = v.to_uppercase();
        }
        if let Some(v) = env_string("MYDOCS_MCP_LOG_FILE") {
            config.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse("MYDOCS_MCP_MAX_CONNECTIONS") {
            config.max_connections = v;
        }
        if let Some(v) = env_parse("MYDOCS_MCP_REQUEST_TIMEOUT") {
            config.request_timeout_secs = v;
        }
        if let Some(v) = env_string("MYDOCS_MCP_DATABASE_URL") {
            config.database_url = v;
        }
        if let Some(v) = env_string("MYDOCS_MCP_DOCUMENT_ROOT") {
            config.document_root = PathBuf::from(v);
        }
        if let Some(v) = env_parse("MYDOCS_MCP_MAX_DOCUMENT_SIZE") {
            config.max_document_size = v;
        }
        if let Some(v) = env_string("MYDOCS_MCP_SUPPORTED_EXTENSIONS") {
            config.supported_extensions = v
                .split(',')
                .map(|ext| ext.trim().to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Some(v) = env_parse("MYDOCS_MCP_MAX_SEARCH_RESULTS") {
            config.max_search_results = v;
        }
        if let Some(v) = env_parse("MYDOCS_MCP_DEFAULT_SEARCH_LIMIT") {
            config.default_search_limit = v;
        }
        if let Some(v) = env_bool("MYDOCS_MCP_ENABLE_SEARCH_CACHING") {
            config.enable_search_caching = v;
        }
        if let Some(v) = env_parse("MYDOCS_MCP_SEARCH_CACHE_TTL") {
            config.search_cache_ttl_secs = v;
        }
        if let Some(v) = env_bool("MYDOCS_MCP_DEBUG") {
            config.debug = v;
        }

        config
    }

    /// Resolve the database file path from the `sqlite:///` URL.
    pub fn database_path(&self) -> Result<PathBuf, String> {
        match self.database_url.strip_prefix("sqlite:///") {
            Some(path) => Ok(PathBuf::from(path)),
            None => Err(format!("Unsupported database URL format: {}", self.database_url)),
        }
    }

    /// Create the data directories the server writes to.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Ok(db_path) = self.database_path() {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        std::fs::create_dir_all(&self.document_root)?;
        if let Some(log_file) = &self.log_file {
            if let Some(parent) = log_file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }

    /// Validate settings before startup. Any failure aborts with exit code 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.transport != "stdio" {
            return Err(format!("Invalid transport: {}", self.transport));
        }
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!("Invalid log level: {}", self.log_level));
        }
        if self.max_connections == 0 {
            return Err("max_connections must be positive".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout must be positive".to_string());
        }
        if self.max_document_size == 0 {
            return Err("max_document_size must be positive".to_string());
        }
        if self.max_search_results == 0 {
            return Err("max_search_results must be positive".to_string());
        }
        if self.default_search_limit == 0 {
            return Err("default_search_limit must be positive".to_string());
        }
        self.database_path()?;
        for ext in &self.supported_extensions {
            if !ext.starts_with('.') {
                return Err(format!("File extension must start with dot: {ext}"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watcher configuration
// ---------------------------------------------------------------------------

/// Configuration for the file-system watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directories to monitor. Invalid entries are skipped at start().
    pub watch_directories: Vec<PathBuf>,
    /// Extensions to monitor, with leading dot, lowercase.
    pub watched_extensions: HashSet<String>,
    /// Glob patterns dropped at intake (editor swap files, VCS dirs, ...).
    pub ignore_patterns: Vec<String>,
    pub debounce_delay_ms: u64,
    pub recursive: bool,
    pub max_file_size_mb: u64,
    /// Batched coalescing instead of per-path debouncing.
    pub batch_processing: bool,
    pub batch_delay_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_directories: Vec::new(),
            watched_extensions: [".md", ".txt"].iter().map(|s| s.to_string()).collect(),
            ignore_patterns: [
                "*.tmp",
                "*.swp",
                "*~",
                ".DS_Store",
                "Thumbs.db",
                "__pycache__",
                "*.pyc",
                ".git",
                ".svn",
                ".hg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            debounce_delay_ms: 500,
            recursive: true,
            max_file_size_mb: 10,
            batch_processing: false,
            batch_delay_ms: 1000,
        }
    }
}

impl WatcherConfig {
    /// Load watcher settings from `MYDOCS_WATCH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dirs) = env_string("MYDOCS_WATCH_DIRS") {
            let separator = if cfg!(windows) { ';' } else { ':' };
            config.watch_directories = dirs
                .split(separator)
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(exts) = env_string("MYDOCS_WATCH_EXTENSIONS") {
            config.watched_extensions = exts
                .split(',')
                .map(|ext| ext.trim().to_lowercase())
                .filter(|ext| !ext.is_empty())
                .map(|ext| if ext.starts_with('.') { ext } else { format!(".{ext}") })
                .collect();
        }
        if let Some(v) = env_parse("MYDOCS_DEBOUNCE_DELAY_MS") {
            config.debounce_delay_ms = v;
        }
        if let Some(v) = env_bool("MYDOCS_RECURSIVE_WATCH") {
            config.recursive = v;
        }
        if let Some(v) = env_parse("MYDOCS_MAX_FILE_SIZE_MB") {
            config.max_file_size_mb = v;
        }
        if let Some(v) = env_bool("MYDOCS_BATCH_PROCESSING") {
            config.batch_processing = v;
        }
        if let Some(v) = env_parse("MYDOCS_BATCH_DELAY_MS") {
            config.batch_delay_ms = v;
        }

        config
    }

    /// Extension check shared by the live and deletion filter paths.
    pub fn watches_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.watched_extensions.contains(&format!(".{}", ext.to_lowercase())),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn database_path_strips_sqlite_scheme() {
        let config = ServerConfig::default();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("data/mydocs.db"));
    }

    #[test]
    fn database_path_rejects_other_schemes() {
        let config = ServerConfig {
            database_url: "postgres://localhost/mydocs".to_string(),
            ..Default::default()
        };
        assert!(config.database_path().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_transport() {
        let config = ServerConfig { transport: "websocket".to_string(), ..Default::default() };
        assert!(config.validate().unwrap_err().contains("transport"));
    }

    #[test]
    fn validate_rejects_dotless_extension() {
        let mut config = ServerConfig::default();
        config.supported_extensions.insert("md".to_string());
        assert!(config.validate().unwrap_err().contains("dot"));
    }

    #[test]
    fn watcher_extension_check_is_case_insensitive() {
        let config = WatcherConfig::default();
        assert!(config.watches_extension(Path::new("/tmp/Notes.MD")));
        assert!(config.watches_extension(Path::new("/tmp/a.txt")));
        assert!(!config.watches_extension(Path::new("/tmp/a.rs")));
        assert!(!config.watches_extension(Path::new("/tmp/Makefile")));
    }
}
