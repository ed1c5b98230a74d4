//! Reflexion strategy: runs the ReAct loop, then asks the
//! model to critique its own answer; if the critique says the answer is
//! unsatisfactory, the invocation reruns with the critique folded into the
//! input, up to a fixed cap of attempts.

use as_domain::tool::Message;
use as_domain::{Invocation, InvocationResponse, Result, TokenUsage};
use as_providers::traits::ChatRequest;

use crate::react::ReActStrategy;
use crate::strategy::{Strategy, StrategyContext, StrategyInput};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct ReflexionStrategy {
    pub max_attempts: u32,
}

impl Default for ReflexionStrategy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

fn critique_is_satisfactory(critique: &str) -> bool {
    let lower = critique.to_lowercase();
    lower.trim_start().starts_with("satisfactory") || lower.contains("no changes needed")
}

#[async_trait::async_trait]
impl Strategy for ReflexionStrategy {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse> {
        let mut attempt_input = input.invocation.input.clone();
        let mut turns_total = 0u32;
        let mut tokens_total = TokenUsage::default();
        let mut tool_calls_total = Vec::new();
        let mut last_response = InvocationResponse::empty();

        for attempt in 0..self.max_attempts.max(1) {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let invocation = Invocation {
                agent_name: input.invocation.agent_name.clone(),
                input: attempt_input.clone(),
                session_id: input.invocation.session_id.clone(),
                stream: false,
                overrides: input.invocation.overrides.clone(),
            };
            let step_input = StrategyInput {
                system_prompt: input.system_prompt,
                history: if attempt == 0 { input.history.clone() } else { Vec::new() },
                invocation: &invocation,
            };
            let resp = ReActStrategy.execute(ctx, step_input).await?;
            turns_total += resp.turns;
            tokens_total.input += resp.tokens.input;
            tokens_total.output += resp.tokens.output;
            tool_calls_total.extend(resp.tool_calls.clone());
            let had_error = resp.error.is_some();
            last_response = resp;
            if had_error {
                break;
            }

            if attempt + 1 >= self.max_attempts {
                break;
            }

            let critique_prompt = format!(
                "Critique the following answer to the request \"{}\". If it fully and \
                 correctly satisfies the request, respond with exactly \"satisfactory\". \
                 Otherwise, respond with a short list of concrete fixes needed.\n\nAnswer:\n{}",
                input.invocation.input, last_response.output
            );
            let critique_resp = ctx
                .llm
                .chat(&ChatRequest {
                    messages: vec![Message::user(&critique_prompt)],
                    ..Default::default()
                })
                .await?;
            tokens_total.output += critique_resp.usage.map(|u| u.completion_tokens as u64).unwrap_or(0);

            if critique_is_satisfactory(&critique_resp.content) {
                break;
            }
            attempt_input = format!(
                "{}\n\nRevise your previous answer to address this critique:\n{}\n\nPrevious answer:\n{}",
                input.invocation.input, critique_resp.content, last_response.output
            );
        }

        Ok(InvocationResponse {
            output: last_response.output,
            turns: turns_total,
            tokens: tokens_total,
            tool_calls: tool_calls_total,
            error: last_response.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_satisfactory_critique() {
        assert!(critique_is_satisfactory("Satisfactory"));
        assert!(critique_is_satisfactory("satisfactory."));
        assert!(!critique_is_satisfactory("Needs more detail on X"));
    }
}
