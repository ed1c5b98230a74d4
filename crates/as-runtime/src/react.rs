//! ReAct strategy: the default agentic loop. Prepends the
//! system prompt and loaded history to the user input, then alternates
//! LLM calls with concurrent tool dispatch until the model ends the turn,
//! the turn cap is hit, or the token budget is exhausted.

use std::time::Instant;

use as_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall as DomainToolCall};
use as_domain::{Error, InvocationResponse, Result, TokenUsage, ToolCallRecord};
use as_providers::traits::ChatRequest;
use as_tools::registry::ToolCall as RegistryToolCall;
use futures_util::StreamExt;

use crate::strategy::{Strategy, StrategyContext, StrategyEvent, StrategyInput};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReActStrategy;

fn assistant_message(text: &str, tool_calls: &[DomainToolCall]) -> Message {
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(ContentPart::Text { text: text.to_string() });
    }
    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }
    if parts.is_empty() {
        Message::assistant(text)
    } else {
        Message { role: Role::Assistant, content: MessageContent::Parts(parts) }
    }
}

#[async_trait::async_trait]
impl Strategy for ReActStrategy {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse> {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(Message::system(input.system_prompt));
        messages.extend(input.history);
        messages.push(Message::user(&input.invocation.input));

        let tool_defs = ctx.registry.definitions();
        let mut tokens_used: u64 = 0;
        let mut tool_call_records: Vec<ToolCallRecord> = Vec::new();
        let mut final_text = String::new();
        let mut turn: u32 = 0;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Internal("invocation cancelled".into()));
            }
            if turn >= ctx.max_turns {
                break;
            }
            turn += 1;

            let estimated_next = ctx.estimator.estimate_messages(&messages);
            if ctx.token_budget > 0 && tokens_used + estimated_next > ctx.token_budget {
                ctx.emit(StrategyEvent::BudgetExhausted { used: tokens_used, limit: ctx.token_budget });
                ctx.emit(StrategyEvent::Done);
                // budget_exhausted ends the invocation cleanly with a
                // populated response carrying an `error` field, not a propagated Err.
                return Ok(InvocationResponse {
                    output: final_text,
                    turns: turn,
                    tokens: TokenUsage { input: 0, output: tokens_used },
                    tool_calls: tool_call_records,
                    error: Some(
                        Error::BudgetExhausted { used: tokens_used, limit: ctx.token_budget }
                            .to_string(),
                    ),
                });
            }

            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                ..Default::default()
            };

            let mut stream = tokio::select! {
                r = ctx.llm.chat_stream(&req) => r?,
                _ = ctx.cancel.cancelled() => return Err(Error::Internal("invocation cancelled".into())),
            };

            let mut text = String::new();
            let mut tool_calls: Vec<DomainToolCall> = Vec::new();
            let mut finish_reason: Option<String> = None;

            loop {
                let next = tokio::select! {
                    n = stream.next() => n,
                    _ = ctx.cancel.cancelled() => return Err(Error::Internal("invocation cancelled".into())),
                };
                let Some(event) = next else { break };
                match event? {
                    as_domain::stream::StreamEvent::Token { text: t } => {
                        ctx.emit(StrategyEvent::TextDelta(t.clone()));
                        text.push_str(&t);
                    }
                    as_domain::stream::StreamEvent::ToolCallStarted { call_id, tool_name } => {
                        ctx.emit(StrategyEvent::ToolCallStarted { call_id, tool_name });
                    }
                    as_domain::stream::StreamEvent::ToolCallDelta { .. } => {}
                    as_domain::stream::StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                        tool_calls.push(DomainToolCall { call_id, tool_name, arguments });
                    }
                    as_domain::stream::StreamEvent::Done { usage, finish_reason: fr } => {
                        if let Some(u) = usage {
                            tokens_used += u.total_tokens as u64;
                        }
                        finish_reason = fr;
                    }
                    as_domain::stream::StreamEvent::Error { message } => {
                        return Err(Error::Provider { provider: ctx.llm.provider_id().to_string(), message });
                    }
                }
            }

            final_text = text.clone();

            match finish_reason.as_deref() {
                Some("tool_use") | Some("tool_calls") if !tool_calls.is_empty() => {
                    messages.push(assistant_message(&text, &tool_calls));

                    let calls: Vec<RegistryToolCall> = tool_calls
                        .iter()
                        .map(|tc| RegistryToolCall { id: tc.call_id.clone(), name: tc.tool_name.clone(), input: tc.arguments.clone() })
                        .collect();

                    let started = Instant::now();
                    let results = ctx.registry.execute_concurrent(calls, ctx.tool_timeout).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;

                    for (tc, result) in tool_calls.iter().zip(results.iter()) {
                        ctx.emit(StrategyEvent::ToolCallFinished { call_id: result.tool_use_id.clone(), is_error: result.is_error });
                        messages.push(Message::tool_result(&result.tool_use_id, &result.content));
                        tool_call_records.push(ToolCallRecord {
                            name: tc.tool_name.clone(),
                            input: tc.arguments.clone(),
                            output: result.content.clone(),
                            error: result.is_error.then(|| result.content.clone()),
                            duration_ms: elapsed_ms,
                        });
                    }

                    ctx.emit(StrategyEvent::TurnCompleted { turn });
                    continue;
                }
                _ => {
                    ctx.emit(StrategyEvent::TurnCompleted { turn });
                    break;
                }
            }
        }

        ctx.emit(StrategyEvent::Done);
        Ok(InvocationResponse {
            output: final_text,
            turns: turn,
            tokens: TokenUsage { input: 0, output: tokens_used },
            tool_calls: tool_call_records,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use as_domain::capability::LlmCapabilities;
    use as_domain::stream::{BoxStream, StreamEvent};
    use as_providers::traits::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};
    use as_providers::LlmProvider;
    use as_tools::registry::ToolExecutor;
    use serde_json::{json, Value};

    struct ScriptedProvider {
        turns: Mutex<Vec<Vec<StreamEvent>>>,
        calls: AtomicUsize,
        caps: LlmCapabilities,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            unimplemented!("test uses chat_stream only")
        }

        async fn chat_stream(&self, _req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let events = self.turns.lock().unwrap()[idx].clone();
            Ok(Box::pin(futures_util::stream::iter(events.into_iter().map(Ok))))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.caps
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl ToolExecutor for Echo {
        async fn execute(&self, input: Value) -> (String, Option<String>) {
            (input.to_string(), None)
        }
    }

    fn ctx_with(provider: ScriptedProvider, registry: as_tools::Registry) -> StrategyContext {
        StrategyContext {
            registry: Arc::new(registry),
            llm: Arc::new(provider),
            estimator: Arc::new(crate::estimator::HeuristicEstimator),
            max_turns: 5,
            token_budget: 1_000_000,
            tool_timeout: std::time::Duration::from_secs(5),
            cancel: tokio_util::sync::CancellationToken::new(),
            on_event: None,
            invoker: None,
        }
    }

    #[tokio::test]
    async fn ends_turn_without_tool_calls() {
        let provider = ScriptedProvider {
            turns: Mutex::new(vec![vec![
                StreamEvent::Token { text: "hello".into() },
                StreamEvent::Done { usage: None, finish_reason: Some("end_turn".into()) },
            ]]),
            calls: AtomicUsize::new(0),
            caps: LlmCapabilities::default(),
        };
        let ctx = ctx_with(provider, as_tools::Registry::new());
        let invocation = as_domain::Invocation { agent_name: "a".into(), input: "hi".into(), ..Default::default() };
        let resp = ReActStrategy
            .execute(&ctx, StrategyInput { system_prompt: "be nice", history: vec![], invocation: &invocation })
            .await
            .unwrap();
        assert_eq!(resp.output, "hello");
        assert_eq!(resp.turns, 1);
        assert!(resp.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn dispatches_tool_then_ends_turn() {
        let mut registry = as_tools::Registry::new();
        registry.register(
            "echo",
            as_domain::tool::ToolDefinition { name: "echo".into(), description: String::new(), parameters: json!({}) },
            Arc::new(Echo),
        );

        let provider = ScriptedProvider {
            turns: Mutex::new(vec![
                vec![
                    StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "echo".into() },
                    StreamEvent::ToolCallFinished { call_id: "c1".into(), tool_name: "echo".into(), arguments: json!({"x": 1}) },
                    StreamEvent::Done { usage: None, finish_reason: Some("tool_use".into()) },
                ],
                vec![
                    StreamEvent::Token { text: "done".into() },
                    StreamEvent::Done { usage: None, finish_reason: Some("end_turn".into()) },
                ],
            ]),
            calls: AtomicUsize::new(0),
            caps: LlmCapabilities::default(),
        };
        let ctx = ctx_with(provider, registry);
        let invocation = as_domain::Invocation { agent_name: "a".into(), input: "hi".into(), ..Default::default() };
        let resp = ReActStrategy
            .execute(&ctx, StrategyInput { system_prompt: "be nice", history: vec![], invocation: &invocation })
            .await
            .unwrap();
        assert_eq!(resp.output, "done");
        assert_eq!(resp.turns, 2);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "echo");
    }

    #[tokio::test]
    async fn stops_at_max_turns_keeping_partial_text() {
        let provider = ScriptedProvider {
            turns: Mutex::new(vec![vec![
                StreamEvent::Token { text: "partial".into() },
                StreamEvent::Done { usage: None, finish_reason: Some("max_tokens".into()) },
            ]]),
            calls: AtomicUsize::new(0),
            caps: LlmCapabilities::default(),
        };
        let mut ctx = ctx_with(provider, as_tools::Registry::new());
        ctx.max_turns = 1;
        let invocation = as_domain::Invocation { agent_name: "a".into(), input: "hi".into(), ..Default::default() };
        let resp = ReActStrategy
            .execute(&ctx, StrategyInput { system_prompt: "be nice", history: vec![], invocation: &invocation })
            .await
            .unwrap();
        assert_eq!(resp.output, "partial");
        assert_eq!(resp.turns, 1);
    }

    #[tokio::test]
    async fn budget_exhausted_returns_ok_with_error_field_populated() {
        // Each turn "costs" 100 tokens (via Done.usage); the estimator's
        // pre-turn check trips on turn 2 once tokens_used=100 pushes past a
        // budget of 150.
        let provider = ScriptedProvider {
            turns: Mutex::new(vec![vec![
                StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "echo".into() },
                StreamEvent::ToolCallFinished { call_id: "c1".into(), tool_name: "echo".into(), arguments: json!({}) },
                StreamEvent::Done {
                    usage: Some(as_domain::stream::Usage { prompt_tokens: 50, completion_tokens: 50, total_tokens: 100 }),
                    finish_reason: Some("tool_use".into()),
                },
            ]]),
            calls: AtomicUsize::new(0),
            caps: LlmCapabilities::default(),
        };
        let mut registry = as_tools::Registry::new();
        registry.register(
            "echo",
            as_domain::tool::ToolDefinition { name: "echo".into(), description: String::new(), parameters: json!({}) },
            Arc::new(Echo),
        );
        let mut ctx = ctx_with(provider, registry);
        ctx.max_turns = 100;
        ctx.token_budget = 150;
        let invocation = as_domain::Invocation { agent_name: "a".into(), input: "hi".into(), ..Default::default() };
        let resp = ReActStrategy
            .execute(&ctx, StrategyInput { system_prompt: "be nice", history: vec![], invocation: &invocation })
            .await
            .unwrap();
        assert!(resp.turns <= 2);
        assert!(resp.error.unwrap().contains("budget exhausted"));
    }
}
