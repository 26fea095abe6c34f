//! Integration tests for all MCP tools via dispatch_jsonrpc().
//!
//! Each test builds a ServerState over a scratch store, then sends JSON-RPC
//! requests and validates the responses.

mod helpers;

use helpers::TestHarness;
use serde_json::json;

// ---------------------------------------------------------------------------
// Protocol tests
// ---------------------------------------------------------------------------

#[test]
fn test_initialize() {
    let h = TestHarness::new();
    let resp = h.initialize();

    // Should negotiate the requested protocol version
    let version = resp["result"]["protocolVersion"].as_str().unwrap();
    assert_eq!(version, "2025-11-25");

    // Should report server info
    let name = resp["result"]["serverInfo"]["name"].as_str().unwrap();
    assert_eq!(name, "cortex");

    // Should include tools capability
    assert!(resp["result"]["capabilities"]["tools"].is_object());
}

#[test]
fn test_initialize_with_unknown_version_offers_ours() {
    let h = TestHarness::new();
    let resp = h
        .dispatch(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "1999-01-01" }
        }))
        .unwrap();
    assert_eq!(resp["result"]["protocolVersion"].as_str().unwrap(), "2025-11-25");
}

#[test]
fn test_tools_list() {
    let h = TestHarness::new();
    let resp = h
        .dispatch(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .unwrap();
    let tools = resp["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 14);

    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "cortex_create",
        "cortex_get",
        "cortex_update",
        "cortex_move",
        "cortex_remove",
        "cortex_list",
        "cortex_prune",
        "cortex_recent",
        "cortex_reindex",
        "cortex_category_create",
        "cortex_category_delete",
        "cortex_category_describe",
        "cortex_stores",
        "cortex_status",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
}

#[test]
fn test_unknown_method() {
    let h = TestHarness::new();
    let resp = h
        .dispatch(json!({ "jsonrpc": "2.0", "id": 3, "method": "bogus/method" }))
        .unwrap();
    assert_eq!(resp["error"]["code"].as_i64().unwrap(), -32601);
}

#[test]
fn test_ping() {
    let h = TestHarness::new();
    let resp = h.dispatch(json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" })).unwrap();
    assert!(resp["result"].is_object());
}

#[test]
fn test_notifications_produce_no_response() {
    let h = TestHarness::new();
    assert!(h
        .dispatch(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .is_none());
}

// ---------------------------------------------------------------------------
// Memory tools
// ---------------------------------------------------------------------------

#[test]
fn test_create_and_get() {
    let h = TestHarness::new();
    let (_, err) = h.call_tool("cortex_category_create", json!({ "path": "project/notes" }));
    assert!(!err);

    let (text, err) = h.call_tool(
        "cortex_create",
        json!({
            "path": "project/notes/alpha",
            "content": "hello world",
            "tags": ["greeting"],
        }),
    );
    assert!(!err, "cortex_create failed: {text}");
    assert!(text.contains("project/notes/alpha"));

    let (text, err) = h.call_tool("cortex_get", json!({ "path": "project/notes/alpha" }));
    assert!(!err, "cortex_get failed: {text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["content"].as_str().unwrap(), "hello world");
    assert_eq!(value["metadata"]["tags"][0].as_str().unwrap(), "greeting");
    assert_eq!(value["metadata"]["source"].as_str().unwrap(), "mcp");
}

#[test]
fn test_create_without_category_fails_with_guidance() {
    let h = TestHarness::new();
    let (text, err) =
        h.call_tool("cortex_create", json!({ "path": "missing/alpha", "content": "x" }));
    assert!(err);
    assert!(text.contains("CATEGORY_NOT_FOUND"), "unexpected error: {text}");
    assert!(text.contains("create it first"), "error should guide the caller: {text}");
}

#[test]
fn test_create_normalizes_path() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "a/b" }));
    let (text, err) =
        h.call_tool("cortex_create", json!({ "path": "a//b//c", "content": "x" }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["path"].as_str().unwrap(), "a/b/c");
}

#[test]
fn test_get_missing_memory() {
    let h = TestHarness::new();
    let (text, err) = h.call_tool("cortex_get", json!({ "path": "ghost/memory" }));
    assert!(err);
    assert!(text.contains("MEMORY_NOT_FOUND"), "unexpected error: {text}");
}

#[test]
fn test_unknown_store_is_reported() {
    let h = TestHarness::new();
    let (text, err) =
        h.call_tool("cortex_get", json!({ "path": "a/b", "store": "nope" }));
    assert!(err);
    assert!(text.contains("STORE_NOT_FOUND"), "unexpected error: {text}");
}

#[test]
fn test_update_clears_expiry_with_null() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool(
        "cortex_create",
        json!({
            "path": "notes/a",
            "content": "x",
            "expires_at": "2030-01-01T00:00:00Z"
        }),
    );

    let (text, err) =
        h.call_tool("cortex_update", json!({ "path": "notes/a", "expires_at": null }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["metadata"].get("expiresAt").is_none(), "expiry should be cleared: {text}");

    // Omitting expires_at keeps the current value.
    let (text, _) = h.call_tool(
        "cortex_update",
        json!({ "path": "notes/a", "expires_at": "2040-01-01T00:00:00Z" }),
    );
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["metadata"]["expiresAt"].as_str().unwrap(), "2040-01-01T00:00:00Z");

    let (text, _) = h.call_tool("cortex_update", json!({ "path": "notes/a", "tags": ["t"] }));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["metadata"]["expiresAt"].as_str().unwrap(), "2040-01-01T00:00:00Z");
}

#[test]
fn test_update_with_no_fields_is_invalid() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool("cortex_create", json!({ "path": "notes/a", "content": "x" }));

    let (text, err) = h.call_tool("cortex_update", json!({ "path": "notes/a" }));
    assert!(err);
    assert!(text.contains("INVALID_INPUT"), "unexpected error: {text}");
}

#[test]
fn test_move_and_collision() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "a" }));
    h.call_tool("cortex_category_create", json!({ "path": "b" }));
    h.call_tool("cortex_create", json!({ "path": "a/x", "content": "first" }));
    h.call_tool("cortex_create", json!({ "path": "b/x", "content": "second" }));

    let (text, err) = h.call_tool("cortex_move", json!({ "from": "a/x", "to": "b/x" }));
    assert!(err);
    assert!(text.contains("DESTINATION_EXISTS"), "unexpected error: {text}");

    let (text, err) = h.call_tool("cortex_move", json!({ "from": "a/x", "to": "b/y" }));
    assert!(!err, "{text}");

    let (_, err) = h.call_tool("cortex_get", json!({ "path": "b/y" }));
    assert!(!err);
    let (text, err) = h.call_tool("cortex_get", json!({ "path": "a/x" }));
    assert!(err);
    assert!(text.contains("MEMORY_NOT_FOUND"));
}

#[test]
fn test_remove() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool("cortex_create", json!({ "path": "notes/a", "content": "x" }));

    let (text, err) = h.call_tool("cortex_remove", json!({ "path": "notes/a" }));
    assert!(!err, "{text}");

    let (text, err) = h.call_tool("cortex_get", json!({ "path": "notes/a" }));
    assert!(err);
    assert!(text.contains("MEMORY_NOT_FOUND"), "{text}");
}

#[test]
fn test_list_scoped_and_rooted() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "project/notes" }));
    h.call_tool("cortex_category_create", json!({ "path": "journal" }));
    h.call_tool("cortex_create", json!({ "path": "project/notes/a", "content": "x" }));
    h.call_tool("cortex_create", json!({ "path": "journal/b", "content": "y" }));

    let (text, err) = h.call_tool("cortex_list", json!({}));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["memories"].as_array().unwrap().len(), 2);
    assert_eq!(value["subcategories"].as_array().unwrap().len(), 2);

    let (text, err) = h.call_tool("cortex_list", json!({ "category": "project" }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["memories"].as_array().unwrap().len(), 1);
    assert_eq!(value["memories"][0]["path"].as_str().unwrap(), "project/notes/a");
}

#[test]
fn test_prune_dry_run_then_real() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool(
        "cortex_create",
        json!({ "path": "notes/old", "content": "x", "expires_at": "2020-01-01T00:00:00Z" }),
    );
    h.call_tool("cortex_create", json!({ "path": "notes/keep", "content": "y" }));

    let (text, err) = h.call_tool("cortex_prune", json!({ "dry_run": true }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["dryRun"].as_bool().unwrap());
    assert_eq!(value["pruned"].as_array().unwrap().len(), 1);

    // Dry run leaves the memory in place.
    let (_, err) = h.call_tool("cortex_get", json!({ "path": "notes/old", "include_expired": true }));
    assert!(!err);

    let (text, err) = h.call_tool("cortex_prune", json!({}));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["pruned"].as_array().unwrap().len(), 1);

    let (text, err) = h.call_tool("cortex_get", json!({ "path": "notes/old", "include_expired": true }));
    assert!(err);
    assert!(text.contains("MEMORY_NOT_FOUND"), "{text}");
}

#[test]
fn test_recent_orders_and_limits() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool("cortex_create", json!({ "path": "notes/a", "content": "1" }));
    h.call_tool("cortex_create", json!({ "path": "notes/b", "content": "2" }));
    h.call_tool("cortex_update", json!({ "path": "notes/a", "content": "1 again" }));

    let (text, err) = h.call_tool("cortex_recent", json!({ "limit": 1 }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["count"].as_u64().unwrap(), 1);
    assert_eq!(value["category"].as_str().unwrap(), "all");
    // The updated memory is the most recent one.
    assert_eq!(value["memories"][0]["path"].as_str().unwrap(), "notes/a");
}

#[test]
fn test_reindex_reports_counts() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "notes" }));
    h.call_tool("cortex_create", json!({ "path": "notes/a", "content": "x" }));

    let (text, err) = h.call_tool("cortex_reindex", json!({}));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["indexedMemories"].as_u64().unwrap(), 1);
    assert!(value["warnings"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Category tools
// ---------------------------------------------------------------------------

#[test]
fn test_category_create_is_idempotent_in_result() {
    let h = TestHarness::new();
    let (text, err) = h.call_tool("cortex_category_create", json!({ "path": "a/b" }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["created"].as_bool().unwrap());

    let (text, _) = h.call_tool("cortex_category_create", json!({ "path": "a/b" }));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(!value["created"].as_bool().unwrap());
}

#[test]
fn test_category_delete_cascades() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "a/b" }));
    h.call_tool("cortex_create", json!({ "path": "a/b/x", "content": "x" }));

    let (text, err) = h.call_tool("cortex_category_delete", json!({ "path": "a" }));
    assert!(!err, "{text}");

    let (text, err) = h.call_tool("cortex_get", json!({ "path": "a/b/x" }));
    assert!(err);
    assert!(text.contains("MEMORY_NOT_FOUND"), "{text}");
}

#[test]
fn test_category_describe_and_root_rejection() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "a/b" }));

    let (text, err) = h.call_tool(
        "cortex_category_describe",
        json!({ "path": "a/b", "description": "Inner notes" }),
    );
    assert!(!err, "{text}");

    let (text, err) = h.call_tool("cortex_list", json!({ "category": "a" }));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["subcategories"][0]["description"].as_str().unwrap(), "Inner notes");

    let (text, err) =
        h.call_tool("cortex_category_describe", json!({ "path": "", "description": "x" }));
    assert!(err);
    assert!(text.contains("ROOT_CATEGORY_NOT_ALLOWED"), "{text}");
}

// ---------------------------------------------------------------------------
// Store tools
// ---------------------------------------------------------------------------

#[test]
fn test_stores_lists_default() {
    let h = TestHarness::new();
    let (text, err) = h.call_tool("cortex_stores", json!({}));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let stores = value["stores"].as_array().unwrap();
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0]["name"].as_str().unwrap(), "default");
    assert!(stores[0]["isDefault"].as_bool().unwrap());
}

#[test]
fn test_status_counts_categories_and_memories() {
    let h = TestHarness::new();
    h.call_tool("cortex_category_create", json!({ "path": "a/b" }));
    h.call_tool("cortex_create", json!({ "path": "a/b/x", "content": "x" }));

    let (text, err) = h.call_tool("cortex_status", json!({}));
    assert!(!err, "{text}");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let store = &value["stores"][0];
    assert!(store["reachable"].as_bool().unwrap());
    assert_eq!(store["categories"].as_u64().unwrap(), 2);
    assert_eq!(store["memories"].as_u64().unwrap(), 1);
}

#[test]
fn test_unknown_tool_is_an_error() {
    let h = TestHarness::new();
    let (text, err) = h.call_tool("cortex_teleport", json!({}));
    assert!(err);
    assert!(text.contains("Unknown tool"), "{text}");
}
