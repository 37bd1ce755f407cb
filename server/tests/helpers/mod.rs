//! Test harness for MCP tool integration tests.
//!
//! Builds a `ServerState` over a scratch database in a temp dir and
//! dispatches JSON-RPC requests via `dispatch_jsonrpc()` directly (no
//! subprocess, no real stdio).

use mydocs_server::config::ServerConfig;
use mydocs_server::mcp::dispatch_jsonrpc;
use mydocs_server::types::ServerState;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub state: Arc<ServerState>,
    pub temp_dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = ServerConfig {
            database_url: format!("sqlite:///{}", temp_dir.path().join("mydocs.db").display()),
            document_root: temp_dir.path().join("documents"),
            ..Default::default()
        };
        config.ensure_directories().expect("Failed to create data dirs");
        let state = ServerState::initialize(config).await.expect("Failed to initialize state");
        TestHarness { state: Arc::new(state), temp_dir }
    }

    /// Write a document file under the harness temp dir and return its path.
    pub fn write_doc(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create doc parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write doc");
        path
    }

    /// Send a JSON-RPC request and return the response.
    pub async fn dispatch(&self, msg: Value) -> Option<Value> {
        dispatch_jsonrpc(&self.state, &msg).await
    }

    /// Call a tool via `tools/call`. Returns the parsed result envelope and
    /// whether the call failed.
    pub async fn call_tool(&self, tool: &str, args: Value) -> (Value, bool) {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": tool, "arguments": args }
        });
        let resp = self.dispatch(msg).await.expect("Expected response for tools/call");
        let text = resp["result"]["content"][0]["text"].as_str().unwrap_or("{}");
        let envelope: Value = serde_json::from_str(text).expect("Envelope must be JSON");
        let is_error = resp["result"]["isError"].as_bool().unwrap_or(false);
        assert_eq!(envelope["success"].as_bool(), Some(!is_error));
        (envelope, is_error)
    }

    /// Send an initialize request and return the response.
    pub async fn initialize(&self) -> Value {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.1.0" }
            }
        });
        self.dispatch(msg).await.expect("Expected initialize response")
    }
}
