//! mydocs server library — personal document indexing and search over MCP.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod parsers;
pub mod search;
pub mod tools;
pub mod types;
pub mod watch;

pub use config::{ServerConfig, WatcherConfig};
pub use error::{StoreError, ToolError};
pub use types::ServerState;
