//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the server config. The client/pool logic lives in `as-mcp`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// List of MCP server definitions.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
    /// Connection pool behavior (idle reaping, reconnect policy).
    #[serde(default)]
    pub pool: McpPoolConfig,
}

/// Connection pool configuration shared across all configured servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPoolConfig {
    /// Idle connections are closed after this many seconds of no use.
    #[serde(default = "d_idle_ttl")]
    pub idle_ttl_secs: u64,
    /// A dead connection is retried exactly once before the calling tool
    /// invocation fails with `Error::ToolError`.
    #[serde(default = "d_true")]
    pub reconnect_once: bool,
}

impl Default for McpPoolConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: d_idle_ttl(),
            reconnect_once: true,
        }
    }
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server (tool naming: `{id}/{tool}`).
    pub id: String,
    /// The command to spawn (e.g. `"npx"`). Required for stdio transport.
    #[serde(default)]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Transport type (`"stdio"` or `"sse"`).
    #[serde(default)]
    pub transport: McpTransportKind,
    /// URL for SSE transport.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variables set on the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

fn d_idle_ttl() -> u64 {
    300
}
fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = McpConfig::default();
        assert!(cfg.servers.is_empty());
        assert_eq!(cfg.pool.idle_ttl_secs, 300);
        assert!(cfg.pool.reconnect_once);
    }

    #[test]
    fn stdio_is_default_transport() {
        let cfg: McpServerConfig = toml::from_str(
            r#"
            id = "fs"
            command = "npx"
            args = ["-y", "@modelcontextprotocol/server-filesystem", "."]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
    }
}
