//! `invoke_agent` is the single entry point every HTTP route, the
//! pipeline executor, and agent-to-agent delegation/routing funnel
//! through. `ServerInvoker` is the thin `AgentInvoker` adapter the
//! runtime crate's strategies use to reach it without holding a
//! pointer back into `as-server`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use as_domain::tool::Message;
use as_domain::{Error, Invocation, InvocationResponse, Result};
use as_runtime::delegation::maybe_delegate;
use as_runtime::invoker::AgentInvoker;
use as_runtime::strategy::{EventSink, StrategyContext, StrategyInput};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub struct ServerInvoker {
    pub state: AppState,
}

#[async_trait::async_trait]
impl AgentInvoker for ServerInvoker {
    async fn invoke(&self, agent_name: &str, invocation: Invocation) -> Result<InvocationResponse> {
        invoke_agent(&self.state, agent_name, invocation, None, CancellationToken::new()).await
    }
}

/// Run one invocation end to end: delegation check, strategy dispatch,
/// memory persistence, metrics. `on_event` is `Some` only for the SSE
/// streaming route.
pub async fn invoke_agent(
    state: &AppState,
    agent_name: &str,
    invocation: Invocation,
    on_event: Option<EventSink>,
    cancel: CancellationToken,
) -> Result<InvocationResponse> {
    let started = Instant::now();
    let runtime = state
        .agents
        .get(agent_name)
        .ok_or_else(|| Error::NotFound(format!("agent \"{agent_name}\" not declared")))?;

    let history = if let Some(session_id) = &invocation.session_id {
        runtime.memory.load(state.sessions.as_ref(), session_id).await?
    } else {
        Vec::new()
    };

    let invoker: Arc<dyn AgentInvoker> = Arc::new(ServerInvoker { state: state.clone() });

    if !runtime.config.delegation.is_empty() {
        let rules: Vec<as_runtime::delegation::DelegationRule> = runtime
            .config
            .delegation
            .iter()
            .map(|d| as_runtime::delegation::DelegationRule {
                target_agent: d.target_agent.clone(),
                condition: d.condition.clone(),
            })
            .collect();
        if let Some(response) = maybe_delegate(runtime.llm.as_ref(), invoker.as_ref(), &rules, &invocation).await? {
            record_metrics(state, agent_name, &response, started);
            return Ok(response);
        }
    }

    let tool_timeout = Duration::from_secs(
        state
            .config
            .tools
            .exec
            .timeout_sec
            .max(state.config.tools.http.timeout_sec),
    );
    let token_budget = runtime
        .config
        .token_budget
        .or_else(|| state.config.budgets.for_agent(agent_name))
        .unwrap_or(u64::MAX);

    let ctx = StrategyContext {
        registry: state.tools.clone(),
        llm: runtime.llm.clone(),
        estimator: runtime.estimator.clone(),
        max_turns: runtime.config.max_turns,
        token_budget,
        tool_timeout,
        cancel,
        on_event,
        invoker: Some(invoker),
    };

    let input = StrategyInput {
        system_prompt: &runtime.config.system_prompt,
        history,
        invocation: &invocation,
    };

    let response = runtime.strategy.execute(&ctx, input).await;

    let response = match response {
        Ok(r) => r,
        Err(Error::BudgetExhausted { used, limit }) => InvocationResponse {
            output: String::new(),
            turns: 0,
            tokens: Default::default(),
            tool_calls: Vec::new(),
            error: Some(format!("budget exhausted: used {used}, limit {limit}")),
        },
        Err(e) => return Err(e),
    };

    if let Some(session_id) = &invocation.session_id {
        let mut new_messages = Vec::new();
        new_messages.push(Message::user(&invocation.input));
        if !response.output.is_empty() {
            new_messages.push(Message::assistant(&response.output));
        }
        runtime.memory.save(state.sessions.as_ref(), session_id, new_messages).await?;
        runtime.memory.evict(state.sessions.as_ref(), session_id).await?;
    }

    record_metrics(state, agent_name, &response, started);
    Ok(response)
}

fn record_metrics(state: &AppState, agent_name: &str, response: &InvocationResponse, started: Instant) {
    let status = if response.error.is_some() { "error" } else { "ok" };
    state.metrics.record_invocation(agent_name, status, started.elapsed().as_secs_f64());
    state.metrics.record_tokens(agent_name, "in", response.tokens.input);
    state.metrics.record_tokens(agent_name, "out", response.tokens.output);
    for call in &response.tool_calls {
        let status = if call.error.is_some() { "error" } else { "ok" };
        state.metrics.record_tool_call(agent_name, &call.name, status);
    }
}
