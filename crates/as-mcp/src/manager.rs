//! MCP manager — holds all MCP server connections and orchestrates tool
//! discovery and dispatch.
//!
//! Connections are pooled process-wide: each configured
//! server is lazily initialized at first use, refcounted while borrowed,
//! and reaped by a background task once idle longer than
//! `pool.idle_ttl_secs`. A connection that fails mid-call is invalidated
//! and reconnected exactly once before the call is reported as a tool
//! error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::RwLock;

use as_domain::config::{McpConfig, McpPoolConfig, McpServerConfig, McpTransportKind};
use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An MCP server connection (one per configured server).
pub struct McpServer {
    /// Server ID from config.
    pub id: String,
    /// Tools discovered via `tools/list`.
    pub tools: Vec<McpToolDef>,
    /// Handle to the running process or SSE connection.
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    /// Initialize a server: spawn the process (or connect via SSE),
    /// perform the MCP handshake, and discover tools.
    async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => {
                let t = StdioTransport::spawn(config).map_err(McpError::Transport)?;
                Box::new(t)
            }
            McpTransportKind::Sse => {
                tracing::warn!(
                    server_id = %config.id,
                    "SSE transport is not yet implemented, server will be non-functional"
                );
                Box::new(SseTransport)
            }
        };

        // Step 1: Send `initialize` request.
        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport
            .send_request("initialize", Some(params_value))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!(
                "initialize failed: {err}"
            )));
        }

        tracing::debug!(server_id = %config.id, "MCP initialize response received");

        // Step 2: Send `notifications/initialized` notification.
        transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        tracing::debug!(server_id = %config.id, "sent notifications/initialized");

        // Step 3: Discover tools via `tools/list`.
        let tools_resp = transport
            .send_request("tools/list", None)
            .await
            .map_err(McpError::Transport)?;

        let tools = if tools_resp.is_error() {
            tracing::warn!(
                server_id = %config.id,
                "tools/list returned error, server will have no tools"
            );
            Vec::new()
        } else {
            let result_value = tools_resp.result.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolsListResult>(result_value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(
                        server_id = %config.id,
                        error = %e,
                        "failed to parse tools/list result"
                    );
                    Vec::new()
                }
            }
        };

        tracing::info!(
            server_id = %config.id,
            tool_count = tools.len(),
            "MCP server initialized"
        );

        Ok(Self {
            id: config.id.clone(),
            tools,
            transport,
        })
    }

    /// Check if the server's transport is still alive.
    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Call a tool on this server.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments
        });

        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!(
                "tools/call failed: {err}"
            )));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value).map_err(|e| {
            McpError::Protocol(format!(
                "failed to parse tools/call result: {e}"
            ))
        })
    }

    /// Gracefully shut down the server.
    async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One pooled connection: the live server plus bookkeeping the reaper
/// and refcount need. `refs == 0` and `last_used` older than the TTL
/// makes a connection eligible for reaping.
struct PooledConnection {
    server: McpServer,
    refs: u64,
    last_used: Instant,
}

/// Manager that holds all MCP server connections, keyed by server id.
/// Connections are created lazily on first `call_tool`/`discover` and
/// reaped by a background task once idle past `pool.idle_ttl_secs`.
pub struct McpManager {
    configs: HashMap<String, McpServerConfig>,
    pool: McpPoolConfig,
    connections: RwLock<HashMap<String, PooledConnection>>,
    next_token: AtomicU64,
    reap_guard: Mutex<()>,
}

impl McpManager {
    /// Create an empty manager (no MCP servers configured).
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
            pool: McpPoolConfig::default(),
            connections: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            reap_guard: Mutex::new(()),
        }
    }

    /// Build a manager from config without eagerly connecting. Servers
    /// are started lazily at first use.
    /// server declared in the spec is lazy-started at first use").
    pub fn from_config(config: &McpConfig) -> Self {
        let configs = config
            .servers
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();
        Self {
            configs,
            pool: config.pool.clone(),
            connections: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            reap_guard: Mutex::new(()),
        }
    }

    /// Return (and lazily create) the pooled connection for `server_id`,
    /// bumping its refcount. Caller must `release` when done.
    async fn get(&self, server_id: &str) -> Result<(), McpError> {
        {
            let mut conns = self.connections.write().await;
            if let Some(entry) = conns.get_mut(server_id) {
                entry.refs += 1;
                entry.last_used = Instant::now();
                return Ok(());
            }
        }

        let config = self
            .configs
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        let server = McpServer::initialize(config).await?;

        let mut conns = self.connections.write().await;
        let entry = conns.entry(server_id.to_string()).or_insert_with(|| PooledConnection {
            server,
            refs: 0,
            last_used: Instant::now(),
        });
        entry.refs += 1;
        entry.last_used = Instant::now();
        Ok(())
    }

    fn release(&self, server_id: &str) {
        // Best-effort: decrement without blocking on the async lock by
        // using try_write; a missed decrement only delays reaping.
        if let Ok(mut conns) = self.connections.try_write() {
            if let Some(entry) = conns.get_mut(server_id) {
                entry.refs = entry.refs.saturating_sub(1);
                entry.last_used = Instant::now();
            }
        }
    }

    /// Get all discovered tools across all currently pooled, alive servers.
    /// Servers never yet contacted (lazy-start, no calls made) contribute
    /// no tools until first use; callers that need a static catalog should
    /// rely on the declared config instead.
    pub async fn list_tools(&self) -> Vec<(String, McpToolDef)> {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|e| e.server.is_alive())
            .flat_map(|e| {
                e.server
                    .tools
                    .iter()
                    .map(move |t| (e.server.id.clone(), t.clone()))
            })
            .collect()
    }

    /// Call a tool on a specific server, using the pool. On a transport
    /// failure the connection is invalidated and a fresh one attempted
    /// once (per `pool.reconnect_once`); a second failure surfaces as a
    /// tool error to the caller.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        self.get(server_id).await?;
        let result = self.call_tool_once(server_id, tool_name, arguments.clone()).await;

        let result = match result {
            Err(e) if self.pool.reconnect_once => {
                tracing::warn!(server_id, error = %e, "MCP call failed, invalidating and retrying once");
                self.invalidate(server_id).await;
                self.get(server_id).await?;
                self.call_tool_once(server_id, tool_name, arguments).await
            }
            other => other,
        };

        self.release(server_id);
        result
    }

    async fn call_tool_once(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let conns = self.connections.read().await;
        let entry = conns
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        entry.server.call_tool(tool_name, arguments).await
    }

    async fn invalidate(&self, server_id: &str) {
        let removed = {
            let mut conns = self.connections.write().await;
            conns.remove(server_id)
        };
        if let Some(entry) = removed {
            entry.server.shutdown().await;
        }
    }

    /// Reap connections idle (refs == 0) longer than `idle_ttl_secs`.
    /// Intended to be called periodically by a background task owned by
    /// the orchestrator.
    pub async fn reap_idle(&self) {
        let _guard = self.reap_guard.lock();
        let ttl = Duration::from_secs(self.pool.idle_ttl_secs);
        let stale: Vec<String> = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .filter(|(_, e)| e.refs == 0 && e.last_used.elapsed() > ttl)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in stale {
            tracing::info!(server_id = %id, "reaping idle MCP connection");
            self.invalidate(&id).await;
        }
    }

    /// Spawn the background idle-reaper loop; runs until the returned
    /// handle is aborted or the manager is dropped and the `Arc` count
    /// reaches the handle only.
    pub fn spawn_reaper(self: std::sync::Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.reap_idle().await;
            }
        })
    }

    /// Return the number of currently pooled (connected) servers.
    pub async fn server_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Return the total number of discovered tools across alive pooled servers.
    pub async fn tool_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|e| e.server.is_alive())
            .map(|e| e.server.tools.len())
            .sum()
    }

    /// Check if there are any configured servers.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Gracefully shut down all pooled servers concurrently.
    pub async fn shutdown(&self) {
        let conns = self.connections.write().await;
        let futs: Vec<_> = conns.values().map(|e| e.server.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for as_domain::error::Error {
    fn from(e: McpError) -> Self {
        as_domain::error::Error::ToolError(e.to_string())
    }
}
