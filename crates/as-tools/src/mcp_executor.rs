//! MCP executor: routes calls of the form
//! `"<server>/<tool>"` through the pooled [`as_mcp::McpManager`].
//!
//! A stdio MCP server is lazy-started at first use and reused thereafter
//! by the pool; this executor only owns the name-splitting and result
//! translation (MCP errors surface as tool errors, never propagated
//! exceptions, so the LLM can choose to retry).

use std::sync::Arc;

use serde_json::Value;

use as_mcp::McpManager;

use crate::registry::ToolExecutor;

/// Executes one MCP tool call by splitting the dispatch name on the first
/// `/` into `(server, tool)` and delegating to the shared pool.
pub struct McpExecutor {
    manager: Arc<McpManager>,
    server: String,
    tool: String,
}

impl McpExecutor {
    /// Build an executor bound to a specific `server/tool` pair. The
    /// registry key used at registration time should match the
    /// `"<server>/<tool>"` naming convention.
    pub fn new(manager: Arc<McpManager>, server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            manager,
            server: server.into(),
            tool: tool.into(),
        }
    }

    /// Split a dispatch name of the form `"<server>/<tool>"`.
    pub fn split_name(name: &str) -> Option<(&str, &str)> {
        name.split_once('/')
    }
}

#[async_trait::async_trait]
impl ToolExecutor for McpExecutor {
    async fn execute(&self, input: Value) -> (String, Option<String>) {
        match self.manager.call_tool(&self.server, &self.tool, input).await {
            Ok(result) => {
                let text = result
                    .content
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                if result.is_error {
                    (text, Some("mcp tool reported an error".to_string()))
                } else {
                    (text, None)
                }
            }
            Err(e) => (String::new(), Some(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_splits_on_first_slash() {
        assert_eq!(McpExecutor::split_name("fs/read_file"), Some(("fs", "read_file")));
        assert_eq!(McpExecutor::split_name("fs/nested/tool"), Some(("fs", "nested/tool")));
        assert_eq!(McpExecutor::split_name("bare"), None);
    }
}
