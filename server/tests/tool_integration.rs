//! Integration tests for the three MCP tools via dispatch_jsonrpc().
//!
//! Each test builds a ServerState over a scratch store, seeds files in a
//! temp dir, then sends JSON-RPC requests and validates the envelopes.

mod helpers;

use helpers::TestHarness;
use mydocs_server::db::models::sha256_hex;
use serde_json::json;

// ---------------------------------------------------------------------------
// Protocol tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_initialize() {
    let h = TestHarness::new().await;
    let resp = h.initialize().await;

    let version = resp["result"]["protocolVersion"].as_str().unwrap();
    assert_eq!(version, "2025-06-18");

    let name = resp["result"]["serverInfo"]["name"].as_str().unwrap();
    assert_eq!(name, "mydocs");

    assert!(resp["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_tools_list_catalog() {
    let h = TestHarness::new().await;
    let resp = h
        .dispatch(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .await
        .unwrap();

    let tools = resp["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(names, vec!["indexDocument", "searchDocuments", "getDocument"]);

    for tool in tools {
        let schema = &tool["inputSchema"];
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert!(schema["properties"].is_object());
    }
}

#[tokio::test]
async fn test_unknown_method_returns_32601() {
    let h = TestHarness::new().await;
    let resp = h
        .dispatch(json!({ "jsonrpc": "2.0", "id": 3, "method": "documents/stream" }))
        .await
        .unwrap();
    assert_eq!(resp["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn test_prompts_are_listed() {
    let h = TestHarness::new().await;
    let resp =
        h.dispatch(json!({ "jsonrpc": "2.0", "id": 4, "method": "prompts/list" })).await.unwrap();
    let prompts = resp["result"]["prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 3);
}

// ---------------------------------------------------------------------------
// indexDocument + searchDocuments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_index_then_search_with_cache_round_trip() {
    let h = TestHarness::new().await;
    let path = h.write_doc("a.md", "# Hello\n\nworld example");

    let (envelope, is_error) = h
        .call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() }))
        .await;
    assert!(!is_error, "indexDocument failed: {envelope}");
    assert_eq!(envelope["data"]["status"], json!("indexed"));
    let document_id = envelope["data"]["document_id"].as_i64().unwrap();
    assert!(document_id > 0);

    let (envelope, is_error) = h.call_tool("searchDocuments", json!({ "query": "world" })).await;
    assert!(!is_error, "searchDocuments failed: {envelope}");
    let data = &envelope["data"];
    assert_eq!(data["from_cache"], json!(false));
    assert_eq!(data["results"][0]["document_id"].as_i64(), Some(document_id));
    let snippet = data["results"][0]["content_snippet"].as_str().unwrap();
    assert!(snippet.contains("**world**"), "snippet missing highlight: {snippet}");
    let first_results = data["results"].clone();

    // Identical repeat comes from the cache with identical results.
    let (envelope, is_error) = h.call_tool("searchDocuments", json!({ "query": "world" })).await;
    assert!(!is_error);
    assert_eq!(envelope["data"]["from_cache"], json!(true));
    assert_eq!(envelope["data"]["results"], first_results);
    assert_eq!(envelope["metadata"]["search_method"], json!("cached"));
}

#[tokio::test]
async fn test_search_filters_by_file_type() {
    let h = TestHarness::new().await;
    let md = h.write_doc("one.md", "alpha notes in markdown");
    let txt = h.write_doc("two.txt", "alpha notes in plain text");
    for path in [&md, &txt] {
        let (envelope, is_error) =
            h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
        assert!(!is_error, "index failed: {envelope}");
    }

    let (envelope, is_error) = h
        .call_tool("searchDocuments", json!({ "query": "alpha", "file_type": "markdown" }))
        .await;
    assert!(!is_error);
    let results = envelope["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["file_type"], json!("md"));
    assert_eq!(envelope["data"]["file_type_filter"], json!("md"));
}

#[tokio::test]
async fn test_reindex_on_modification() {
    let h = TestHarness::new().await;
    let path = h.write_doc("b.txt", "red");

    let (envelope, _) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    let first_id = envelope["data"]["document_id"].as_i64().unwrap();

    // Same content, same mtime second: the tool short-circuits.
    let (envelope, is_error) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    assert!(!is_error);
    assert_eq!(envelope["data"]["status"], json!("already_indexed"));

    // Make the mtime observably newer, then modify the body.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    std::fs::write(&path, "red blue").unwrap();

    let (envelope, is_error) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    assert!(!is_error);
    assert_eq!(envelope["data"]["status"], json!("reindexed"));
    assert_eq!(envelope["data"]["document_id"].as_i64(), Some(first_id));

    let (envelope, is_error) = h.call_tool("searchDocuments", json!({ "query": "blue" })).await;
    assert!(!is_error);
    let results = envelope["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["document_id"].as_i64(), Some(first_id));
}

#[tokio::test]
async fn test_sort_by_name() {
    let h = TestHarness::new().await;
    for name in ["zeta.md", "alpha.md"] {
        let path = h.write_doc(name, "shared keyword payload");
        let (envelope, is_error) =
            h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
        assert!(!is_error, "index failed: {envelope}");
    }

    let (envelope, is_error) = h
        .call_tool("searchDocuments", json!({ "query": "payload", "sort_by": "name" }))
        .await;
    assert!(!is_error);
    let results = envelope["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["file_name"], json!("alpha.md"));
    assert_eq!(results[1]["file_name"], json!("zeta.md"));
    assert_eq!(envelope["data"]["sort_by"], json!("name"));
}

#[tokio::test]
async fn test_empty_result_set_is_success() {
    let h = TestHarness::new().await;
    let (envelope, is_error) =
        h.call_tool("searchDocuments", json!({ "query": "nothingindexedyet" })).await;
    assert!(!is_error);
    assert_eq!(envelope["data"]["returned_count"], json!(0));
    assert_eq!(envelope["data"]["total_found"], json!(0));
}

#[tokio::test]
async fn test_query_with_no_valid_terms_fails() {
    let h = TestHarness::new().await;
    let (envelope, is_error) = h.call_tool("searchDocuments", json!({ "query": "x" })).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("no valid search terms"));
}

#[tokio::test]
async fn test_limit_out_of_range_is_validation_error() {
    let h = TestHarness::new().await;
    let (envelope, is_error) =
        h.call_tool("searchDocuments", json!({ "query": "hello", "limit": 500 })).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let h = TestHarness::new().await;
    let path = h.write_doc("script.rs", "fn main() {}");
    let (envelope, is_error) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("Unsupported file type"));
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let h = TestHarness::new().await;
    let missing = h.temp_dir.path().join("ghost.md");
    let (envelope, is_error) =
        h.call_tool("indexDocument", json!({ "file_path": missing.to_str().unwrap() })).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("File not found"));
}

// ---------------------------------------------------------------------------
// getDocument
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_document_not_found_echoes_id() {
    let h = TestHarness::new().await;
    let (envelope, is_error) = h.call_tool("getDocument", json!({ "document_id": 99999 })).await;
    assert!(is_error);
    let error = envelope["error"].as_str().unwrap();
    assert!(error.contains("not found"), "error: {error}");
    assert!(error.contains("99999"), "error: {error}");
}

#[tokio::test]
async fn test_get_document_selector_conflict() {
    let h = TestHarness::new().await;
    let (envelope, is_error) =
        h.call_tool("getDocument", json!({ "document_id": 1, "file_path": "/x" })).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("Only one"));
}

#[tokio::test]
async fn test_get_document_requires_a_selector() {
    let h = TestHarness::new().await;
    let (envelope, is_error) = h.call_tool("getDocument", json!({})).await;
    assert!(is_error);
    assert!(envelope["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn test_round_trip_content_digest() {
    let h = TestHarness::new().await;
    // Plain text with normalized whitespace survives parsing byte for byte.
    let body = "hello world round trip";
    let path = h.write_doc("round.txt", body);

    let (envelope, is_error) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    assert!(!is_error, "index failed: {envelope}");

    let (envelope, is_error) = h
        .call_tool(
            "getDocument",
            json!({ "file_path": path.to_str().unwrap(), "format": "json" }),
        )
        .await;
    assert!(!is_error, "get failed: {envelope}");
    let data = &envelope["data"];
    let content = data["content"].as_str().unwrap();
    assert_eq!(sha256_hex(content), sha256_hex(body));
    assert_eq!(data["file_hash"].as_str().unwrap(), sha256_hex(body));
    assert_eq!(data["retrieval_method"], json!("by_path"));
}

#[tokio::test]
async fn test_get_document_formats_and_metadata() {
    let h = TestHarness::new().await;
    let path = h.write_doc("fmt.md", "# Title\n\nSome **bold** prose");
    let (envelope, _) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    let id = envelope["data"]["document_id"].as_i64().unwrap();

    let (envelope, is_error) = h
        .call_tool("getDocument", json!({ "document_id": id, "format": "text" }))
        .await;
    assert!(!is_error);
    let data = &envelope["data"];
    assert_eq!(data["retrieval_method"], json!("by_id"));
    assert_eq!(data["content_format"], json!("text"));
    let content = data["content"].as_str().unwrap();
    assert!(!content.contains("**"));
    assert!(content.contains("bold"));

    // Stored metadata rows and the raw parser bag are both present.
    assert!(data["metadata"].is_object());
    assert!(data["parsed_metadata"].is_object());
    assert_eq!(data["parsed_metadata"]["parser_type"], json!("markdown"));
    assert!(data["file_stats"]["content_statistics"]["words"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_get_document_truncation_sentinel() {
    let h = TestHarness::new().await;
    let body = "alpha ".repeat(500);
    let path = h.write_doc("big.txt", body.trim());
    let (envelope, _) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    let id = envelope["data"]["document_id"].as_i64().unwrap();

    let (envelope, is_error) = h
        .call_tool("getDocument", json!({ "document_id": id, "max_content_length": 64 }))
        .await;
    assert!(!is_error);
    let data = &envelope["data"];
    assert_eq!(data["content_truncated"], json!(true));
    let content = data["content"].as_str().unwrap();
    assert!(content.contains("[Content truncated due to size limits]"));
}

#[tokio::test]
async fn test_get_document_without_content() {
    let h = TestHarness::new().await;
    let path = h.write_doc("nc.md", "# No content requested");
    let (envelope, _) =
        h.call_tool("indexDocument", json!({ "file_path": path.to_str().unwrap() })).await;
    let id = envelope["data"]["document_id"].as_i64().unwrap();

    let (envelope, is_error) = h
        .call_tool("getDocument", json!({ "document_id": id, "include_content": false }))
        .await;
    assert!(!is_error);
    assert!(envelope["data"].get("content").is_none());
    assert!(envelope["data"].get("file_hash").is_some());
}
