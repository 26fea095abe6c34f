use cortex_core::Cortex;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Server state (shared by stdio and HTTP transports)
// ---------------------------------------------------------------------------

/// Everything a tool call needs: the composition root over the immutable
/// config. Stores are opened per call through the adapter factory.
pub struct ServerState {
    pub cortex: Cortex,
}

// ---------------------------------------------------------------------------
// MCP HTTP session types
// ---------------------------------------------------------------------------

/// One MCP HTTP session, created by `initialize` and addressed by the
/// `Mcp-Session-Id` header.
pub struct McpSession {
    pub protocol_version: String,
    pub last_activity: Instant,
}

impl McpSession {
    pub fn new(protocol_version: String) -> Self {
        McpSession { protocol_version, last_activity: Instant::now() }
    }
}

/// MCP HTTP transport configuration.
pub struct McpConfig {
    /// Origin-header allowlist (DNS rebinding protection).
    pub allowed_origins: Vec<String>,
}

/// Axum state for the MCP HTTP routes.
#[derive(Clone)]
pub struct McpAppContext {
    pub state: Arc<ServerState>,
    pub sessions: Arc<DashMap<String, McpSession>>,
    pub config: Arc<McpConfig>,
}
