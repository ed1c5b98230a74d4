//! `Registry` — name-keyed dispatch over polymorphic tool executors
//!.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use as_domain::tool::ToolDefinition;
use serde_json::Value;

/// On-wire call from the strategy to the registry. `id` is echoed back
/// on the result unchanged so the LLM can correlate.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// On-wire result from the registry back to the strategy.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Polymorphic executor surface every tool transport implements.
/// `Execute` never returns a hard error for tool-domain failures — those
/// are reported as `Ok((output, Some(message)))` so the caller can
/// construct an `is_error: true` tool result ("tool-level
/// failures are not exceptional").
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, input: Value) -> (String, Option<String>);
}

struct Entry {
    #[allow(dead_code)]
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

/// Registers `(definition, executor)` pairs by tool name and dispatches
/// calls to them, fanning concurrent calls out over tasks.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, definition: ToolDefinition, executor: Arc<dyn ToolExecutor>) {
        self.entries.insert(name.into(), Entry { definition, executor });
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.values().map(|e| e.definition.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Dispatch one call by name, bounded by `deadline`. Unknown tool
    /// names and executor-reported failures both become `ToolResult {
    /// is_error: true }`, never a propagated error — only timeouts that
    /// exceed the deadline are reported the same way, since a timed-out
    /// tool call is still something the LLM should be told about, not a
    /// transport failure.
    pub async fn execute(&self, call: ToolCall, deadline: Duration) -> ToolResult {
        let Some(entry) = self.entries.get(&call.name) else {
            return ToolResult::err(call.id, format!("unknown tool: {}", call.name));
        };
        let executor = entry.executor.clone();
        let input = call.input.clone();

        match tokio::time::timeout(deadline, executor.execute(input)).await {
            Ok((output, None)) => ToolResult::ok(call.id, output),
            Ok((output, Some(err))) => {
                if output.is_empty() {
                    ToolResult::err(call.id, err)
                } else {
                    ToolResult::err(call.id, format!("{output}\n{err}"))
                }
            }
            Err(_) => ToolResult::err(call.id, format!("tool '{}' timed out", call.name)),
        }
    }

    /// Fan calls out one task per call, preserving input order in the
    /// output regardless of completion order.
    pub async fn execute_concurrent(self: &Arc<Self>, calls: Vec<ToolCall>, deadline: Duration) -> Vec<ToolResult> {
        let started = Instant::now();
        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let registry = self.clone();
                let remaining = deadline.saturating_sub(started.elapsed());
                tokio::spawn(async move { registry.execute(call, remaining).await })
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(match h.await {
                Ok(r) => r,
                Err(e) => ToolResult::err("unknown", format!("tool task panicked: {e}")),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl ToolExecutor for Echo {
        async fn execute(&self, input: Value) -> (String, Option<String>) {
            (input.to_string(), None)
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ToolExecutor for Failing {
        async fn execute(&self, _input: Value) -> (String, Option<String>) {
            (String::new(), Some("boom".into()))
        }
    }

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({}),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let reg = Registry::new();
        let r = reg
            .execute(
                ToolCall { id: "1".into(), name: "missing".into(), input: json!({}) },
                Duration::from_secs(1),
            )
            .await;
        assert!(r.is_error);
        assert_eq!(r.tool_use_id, "1");
    }

    #[tokio::test]
    async fn known_tool_echoes_id_on_success() {
        let mut reg = Registry::new();
        reg.register("echo", def("echo"), Arc::new(Echo));
        let r = reg
            .execute(
                ToolCall { id: "call-1".into(), name: "echo".into(), input: json!({"x": 1}) },
                Duration::from_secs(1),
            )
            .await;
        assert!(!r.is_error);
        assert_eq!(r.tool_use_id, "call-1");
    }

    #[tokio::test]
    async fn failing_executor_is_reported_as_tool_error_not_propagated() {
        let mut reg = Registry::new();
        reg.register("fail", def("fail"), Arc::new(Failing));
        let r = reg
            .execute(
                ToolCall { id: "2".into(), name: "fail".into(), input: json!({}) },
                Duration::from_secs(1),
            )
            .await;
        assert!(r.is_error);
        assert_eq!(r.content, "boom");
    }

    #[tokio::test]
    async fn execute_concurrent_preserves_call_order() {
        let mut reg = Registry::new();
        reg.register("echo", def("echo"), Arc::new(Echo));
        let reg = Arc::new(reg);
        let calls = vec![
            ToolCall { id: "a".into(), name: "echo".into(), input: json!(1) },
            ToolCall { id: "b".into(), name: "echo".into(), input: json!(2) },
            ToolCall { id: "c".into(), name: "echo".into(), input: json!(3) },
        ];
        let results = reg.execute_concurrent(calls, Duration::from_secs(1)).await;
        let ids: Vec<_> = results.iter().map(|r| r.tool_use_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
