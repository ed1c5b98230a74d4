//! Plan-Execute strategy: a first LLM call produces a
//! numbered plan; each subsequent turn executes one plan step through the
//! same ReAct substrate, carrying the plan and prior step outputs forward
//! as context.

use as_domain::tool::Message;
use as_domain::{InvocationResponse, Invocation, Result, TokenUsage};
use as_providers::traits::ChatRequest;

use crate::react::ReActStrategy;
use crate::strategy::{Strategy, StrategyContext, StrategyInput};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanExecuteStrategy;

fn parse_plan_steps(plan_text: &str) -> Vec<String> {
    plan_text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| {
            // Strip a leading "1.", "1)", "-", or "*" list marker if present.
            let stripped = l
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim_start_matches(['-', '*'])
                .trim();
            stripped.to_string()
        })
        .filter(|l| !l.is_empty())
        .collect()
}

#[async_trait::async_trait]
impl Strategy for PlanExecuteStrategy {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse> {
        let plan_prompt = format!(
            "Break the following request into a short numbered list of concrete steps. \
             Respond with the list only, one step per line.\n\nRequest: {}",
            input.invocation.input
        );
        let mut plan_messages = vec![Message::system(input.system_prompt)];
        plan_messages.extend(input.history.iter().cloned());
        plan_messages.push(Message::user(&plan_prompt));

        let plan_resp = ctx
            .llm
            .chat(&ChatRequest { messages: plan_messages, ..Default::default() })
            .await?;
        let steps = parse_plan_steps(&plan_resp.content);
        let steps = if steps.is_empty() { vec![input.invocation.input.clone()] } else { steps };

        let mut turns_total = 0u32;
        let mut tokens_total = TokenUsage::default();
        let mut tool_calls_total = Vec::new();
        let mut step_outputs = Vec::new();

        for (i, step) in steps.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let context_so_far = if step_outputs.is_empty() {
                String::new()
            } else {
                format!("\n\nCompleted so far:\n{}", step_outputs.join("\n"))
            };
            let step_invocation = Invocation {
                agent_name: input.invocation.agent_name.clone(),
                input: format!("Step {} of {}: {}{}", i + 1, steps.len(), step, context_so_far),
                session_id: input.invocation.session_id.clone(),
                stream: false,
                overrides: input.invocation.overrides.clone(),
            };
            let step_input = StrategyInput {
                system_prompt: input.system_prompt,
                history: Vec::new(),
                invocation: &step_invocation,
            };
            let resp = ReActStrategy.execute(ctx, step_input).await?;
            turns_total += resp.turns;
            tokens_total.input += resp.tokens.input;
            tokens_total.output += resp.tokens.output;
            tool_calls_total.extend(resp.tool_calls);
            step_outputs.push(format!("{}. {}", i + 1, resp.output));
            if resp.error.is_some() {
                return Ok(InvocationResponse {
                    output: step_outputs.join("\n"),
                    turns: turns_total,
                    tokens: tokens_total,
                    tool_calls: tool_calls_total,
                    error: resp.error,
                });
            }
        }

        Ok(InvocationResponse {
            output: step_outputs.join("\n"),
            turns: turns_total,
            tokens: tokens_total,
            tool_calls: tool_calls_total,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_and_bulleted_plans() {
        let plan = "1. Search docs\n2) Summarize findings\n- Respond to user";
        assert_eq!(
            parse_plan_steps(plan),
            vec!["Search docs".to_string(), "Summarize findings".to_string(), "Respond to user".to_string()]
        );
    }

    #[test]
    fn blank_plan_yields_no_steps() {
        assert!(parse_plan_steps("\n\n  \n").is_empty());
    }
}
