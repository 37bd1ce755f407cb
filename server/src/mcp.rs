//! MCP JSON-RPC server over stdio.
//!
//! Line-delimited JSON-RPC 2.0: one JSON object per line on stdin, one per
//! line on stdout. Handles `initialize`, `ping`, `tools/list`, `tools/call`,
//! `resources/list`, `prompts/list` and `prompts/get`; notifications are
//! consumed without a reply, unknown methods return `-32601`, malformed
//! JSON returns `-32700`. Logging goes to stderr — stdout carries only
//! protocol frames.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::types::ServerState;

const PROTOCOL_VERSION: &str = "2025-06-18";

// ---------------------------------------------------------------------------
// JSON-RPC dispatch
// ---------------------------------------------------------------------------

/// Dispatch one JSON-RPC request. Returns `None` for notifications.
pub async fn dispatch_jsonrpc(state: &Arc<ServerState>, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");

    if method.starts_with("notifications/") {
        return None;
    }

    let id = msg.get("id").cloned().unwrap_or(Value::Null);

    let response = match method {
        "initialize" => {
            let requested = msg["params"]["protocolVersion"].as_str().unwrap_or(PROTOCOL_VERSION);
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": requested,
                    "capabilities": {
                        "tools": {},
                        "resources": {},
                        "prompts": {}
                    },
                    "serverInfo": {
                        "name": "mydocs",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }
            })
        }
        "ping" => {
            json!({ "jsonrpc": "2.0", "id": id, "result": {} })
        }
        "tools/list" => {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": state.tools.catalog() }
            })
        }
        "tools/call" => {
            let name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(json!({}));
            debug!(tool = name, "Dispatching tool call");
            let result = state.tools.call(name, &arguments).await;
            let envelope = result.to_value();
            let text = serde_json::to_string(&envelope)
                .unwrap_or_else(|_| "{\"success\":false}".to_string());
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": text }],
                    "isError": !result.success
                }
            })
        }
        "resources/list" => {
            json!({ "jsonrpc": "2.0", "id": id, "result": { "resources": [] } })
        }
        "prompts/list" => {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "prompts": prompts_list() }
            })
        }
        "prompts/get" => {
            let name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(json!({}));
            match get_prompt(name, &arguments) {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                Err(e) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": e }
                }),
            }
        }
        _ => {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found" }
            })
        }
    };

    Some(response)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn prompts_list() -> Value {
    json!([
        {
            "name": "index_document",
            "description": "Index a document file for searching. Use this when the user wants to add a document to the search index or make a document searchable.",
            "arguments": [
                { "name": "file_path", "description": "Path to the document file to index", "required": true }
            ]
        },
        {
            "name": "search_documents",
            "description": "Search through indexed documents. Use this when the user wants to find information, search for content, or query documents.",
            "arguments": [
                { "name": "query", "description": "Search query text", "required": true },
                { "name": "limit", "description": "Maximum number of results to return", "required": false }
            ]
        },
        {
            "name": "get_document",
            "description": "Retrieve a specific document by ID. Use this when the user wants to read or view a specific document's content.",
            "arguments": [
                { "name": "document_id", "description": "ID of the document to retrieve", "required": true }
            ]
        }
    ])
}

fn get_prompt(name: &str, args: &Value) -> Result<Value, String> {
    match name {
        "index_document" => {
            let file_path = args["file_path"].as_str().unwrap_or("");
            Ok(json!({
                "description": format!("Index the document at {file_path}"),
                "messages": [{
                    "role": "user",
                    "content": { "type": "text", "text": format!("Please index the document at: {file_path}") }
                }]
            }))
        }
        "search_documents" => {
            let query = args["query"].as_str().unwrap_or("");
            let limit = args["limit"].as_u64().unwrap_or(10);
            Ok(json!({
                "description": format!("Search indexed documents for '{query}'"),
                "messages": [{
                    "role": "user",
                    "content": { "type": "text", "text": format!("Search for: {query} (up to {limit} results)") }
                }]
            }))
        }
        "get_document" => {
            let document_id = args["document_id"].as_str().unwrap_or("");
            Ok(json!({
                "description": format!("Retrieve document {document_id}"),
                "messages": [{
                    "role": "user",
                    "content": { "type": "text", "text": format!("Get document with ID: {document_id}") }
                }]
            }))
        }
        _ => Err(format!("Unknown prompt: {name}")),
    }
}

// ---------------------------------------------------------------------------
// Stdio server loop
// ---------------------------------------------------------------------------

/// Run the stdio loop until stdin closes. Requests are answered in order;
/// each handler still overlaps freely with the watcher and the cache
/// sweeper on the shared scheduler.
pub async fn run_stdio(state: Arc<ServerState>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let mut initialized = false;

    info!("MCP server ready on stdio");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                let err = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                });
                write_line(&mut stdout, &err).await?;
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");
        if method.starts_with("notifications/") {
            continue;
        }

        // Init ordering: reject non-init requests before initialize.
        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                let err = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32002,
                        "message": "Server not initialized. Send 'initialize' first."
                    }
                });
                write_line(&mut stdout, &err).await?;
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(&state, &msg).await {
            if method == "initialize" {
                initialized = true;
            }
            write_line(&mut stdout, &response).await?;
        }
    }

    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &Value) -> std::io::Result<()> {
    let mut frame = serde_json::to_vec(value).unwrap_or_default();
    frame.push(b'\n');
    stdout.write_all(&frame).await?;
    stdout.flush().await
}
