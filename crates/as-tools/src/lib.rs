//! Tool registry and executor pool.
//!
//! A [`Registry`] holds one [`ToolExecutor`] per declared tool name and
//! dispatches calls to it, fanning concurrent calls out over tasks while
//! preserving result order. Four executor kinds cover the declared tool
//! transports: MCP, HTTP (with an SSRF guard), sandboxed command, and
//! inline sandboxed code.

pub mod command_executor;
pub mod http_executor;
pub mod inline_executor;
pub mod mcp_executor;
pub mod registry;
pub mod ssrf;

pub use registry::{Registry, ToolCall, ToolExecutor, ToolResult};
