//! Test harness for MCP tool integration tests.
//!
//! Builds a `ServerState` over a scratch filesystem store in a temp dir and
//! dispatches JSON-RPC requests via `dispatch_jsonrpc()` directly (no
//! subprocess, no HTTP).

use cortex_core::config::{CortexSettings, StoreDefinition};
use cortex_core::estimate::default_estimator;
use cortex_core::storage::fs::FsAdapter;
use cortex_core::storage::{filesystem_factory, CategoryStore};
use cortex_core::{CategoryPath, Cortex, Slug};
use cortex_server::mcp::dispatch_jsonrpc;
use cortex_server::types::ServerState;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub state: Arc<ServerState>,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a harness with one scaffolded filesystem store named "default".
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store_root = temp_dir.path().join("default");

        // Scaffold the store layout the way `init` would.
        let adapter = FsAdapter::new(store_root.clone(), default_estimator());
        adapter.ensure_category(&CategoryPath::root()).expect("store scaffold");

        let mut stores = BTreeMap::new();
        stores
            .insert(Slug::parse("default").unwrap(), StoreDefinition::filesystem(store_root));

        let cortex = Cortex::new(CortexSettings::default(), stores, filesystem_factory());
        TestHarness { state: Arc::new(ServerState { cortex }), _temp_dir: temp_dir }
    }

    /// Send a JSON-RPC request and return the response.
    pub fn dispatch(&self, msg: Value) -> Option<Value> {
        dispatch_jsonrpc(&self.state, &msg)
    }

    /// Call an MCP tool by name with the given arguments. Returns (text, is_error).
    pub fn call_tool(&self, tool: &str, args: Value) -> (String, bool) {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": tool,
                "arguments": args
            }
        });
        let resp = self.dispatch(msg).expect("Expected response for tools/call");
        let result = &resp["result"];
        let text = result["content"][0]["text"].as_str().unwrap_or("").to_string();
        let is_error = text.starts_with("\u{26a0} Error:");
        (text, is_error)
    }

    /// Send an initialize request and return the response.
    pub fn initialize(&self) -> Value {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-11-25",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.1.0" }
            }
        });
        self.dispatch(msg).expect("Expected initialize response")
    }
}
