use serde::Serialize;

/// Structured trace events emitted across the runtime engine crates.
/// Each variant is logged as a single JSON-tagged `tracing::info!` record
/// (`runtime_event`) so a log pipeline can filter/aggregate by `event`
/// without parsing free-text messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    SessionEvicted {
        session_id: String,
        reason: String,
    },
    MemoryCompacted {
        session_id: String,
        turns_before: usize,
        turns_after: usize,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolDispatched {
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    McpConnectionOpened {
        server_id: String,
    },
    McpConnectionReaped {
        server_id: String,
        idle_secs: u64,
    },
    McpReconnectAttempted {
        server_id: String,
        succeeded: bool,
    },
    StatePlanComputed {
        resource_count: usize,
        creates: usize,
        updates: usize,
        deletes: usize,
    },
    StateApplied {
        resource_count: usize,
        failures: usize,
    },
    AuthLockoutTriggered {
        client_key: String,
        failures: usize,
    },
    DelegationInvoked {
        parent_agent: String,
        child_agent: String,
        depth: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "runtime_event");
    }
}
