//! The agentic-loop substrate shared by every [`Strategy`] impl
//!. Grounded on the turn-loop shape of a ReAct runtime:
//! provider resolution -> message assembly -> turn loop -> concurrent
//! tool dispatch -> persistence -> response.

use std::sync::Arc;
use std::time::Duration;

use as_domain::tool::Message;
use as_domain::{Error, Invocation, InvocationResponse, Result};
use as_providers::LlmProvider;
use tokio_util::sync::CancellationToken;

use crate::estimator::TokenEstimator;
use crate::invoker::AgentInvoker;

/// Events forwarded to a streaming caller (SSE, CLI, dashboard) as the
/// strategy runs. Mirrors `as_domain::stream::StreamEvent` but adds the
/// turn-loop-level events a raw provider stream doesn't carry.
#[derive(Debug, Clone)]
pub enum StrategyEvent {
    TextDelta(String),
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallFinished { call_id: String, is_error: bool },
    TurnCompleted { turn: u32 },
    BudgetExhausted { used: u64, limit: u64 },
    Done,
}

pub type EventSink = Arc<dyn Fn(StrategyEvent) + Send + Sync>;

/// Everything a [`Strategy`] needs that isn't specific to one invocation:
/// the tool registry, the LLM client, the token estimator, and the
/// knobs that bound a turn loop.
#[derive(Clone)]
pub struct StrategyContext {
    pub registry: Arc<as_tools::Registry>,
    pub llm: Arc<dyn LlmProvider>,
    pub estimator: Arc<dyn TokenEstimator>,
    pub max_turns: u32,
    pub token_budget: u64,
    pub tool_timeout: Duration,
    pub cancel: CancellationToken,
    pub on_event: Option<EventSink>,
    /// Present when the strategy may need to invoke another declared agent
    /// (Router, Map-Reduce, delegation). `None` for a bare ReAct loop run
    /// outside an orchestrator that wires agent-to-agent calls.
    pub invoker: Option<Arc<dyn AgentInvoker>>,
}

impl StrategyContext {
    pub fn emit(&self, event: StrategyEvent) {
        if let Some(sink) = &self.on_event {
            sink(event);
        }
    }
}

/// Input assembled for a strategy: the resolved system prompt, the
/// session's prior messages (already evicted/summarized by the caller's
/// memory strategy), and the invocation itself.
pub struct StrategyInput<'a> {
    pub system_prompt: &'a str,
    pub history: Vec<Message>,
    pub invocation: &'a Invocation,
}

/// `Execute(ctx, Invocation, llm_client, registry, on_event?) -> Response`
///. Every concrete loop (ReAct, Plan-Execute, Reflexion,
/// Router, Map-Reduce) implements this over the same [`StrategyContext`].
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse>;
}

/// Raised when the turn loop stops for a reason other than a clean
/// `end_turn`/tool-use exchange; carried alongside whatever text/messages
/// had already accumulated so the caller can still persist partial work.
pub fn budget_exhausted(used: u64, limit: u64) -> Error {
    Error::BudgetExhausted { used, limit }
}
