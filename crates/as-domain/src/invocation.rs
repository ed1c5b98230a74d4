//! Invocation: a request to an agent and the shape of its
//! response. Invocations are not persisted — only their resulting
//! messages (via a session's memory strategy) and run records are.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One request to an agent.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub agent_name: String,
    pub input: String,
    pub session_id: Option<String>,
    pub stream: bool,
    /// Ad-hoc overrides (model, temperature, etc.) keyed by name.
    pub overrides: HashMap<String, String>,
}

/// A single tool call made in the course of an invocation, recorded for
/// the response's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: serde_json::Value,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Input/output token counts for an invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    #[serde(rename = "in")]
    pub input: u64,
    #[serde(rename = "out")]
    pub output: u64,
}

/// Result of running a [`Invocation`] through a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub output: String,
    pub turns: u32,
    pub tokens: TokenUsage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub error: Option<String>,
}

impl InvocationResponse {
    pub fn empty() -> Self {
        Self {
            output: String::new(),
            turns: 0,
            tokens: TokenUsage::default(),
            tool_calls: Vec::new(),
            error: None,
        }
    }
}
