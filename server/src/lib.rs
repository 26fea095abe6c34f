//! Cortex server — MCP transports over the [`cortex_core`] library crate.

pub mod init;
pub mod mcp;
pub mod mcp_http;
pub mod types;
