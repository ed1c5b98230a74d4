//! Map-Reduce strategy: splits the invocation input into
//! parts, fans each part out to a parallel invocation of the same target
//! agent(s) via [`AgentInvoker`], then merges the partial outputs with a
//! final LLM call.

use as_domain::tool::Message;
use as_domain::{Error, Invocation, InvocationResponse, Result, TokenUsage};
use as_providers::traits::ChatRequest;
use futures_util::future::join_all;

use crate::strategy::{Strategy, StrategyContext, StrategyInput};

/// How the input is split before fan-out.
#[derive(Debug, Clone)]
pub enum SplitRule {
    /// One part per non-empty line.
    Lines,
    /// Caller-supplied parts (e.g. pre-chunked documents).
    Fixed(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct MapReduceStrategy {
    /// The agent each split part is mapped to.
    pub map_agent: String,
    pub split: SplitRule,
    /// How to prompt the reduce step over the collected map outputs.
    pub reduce_prompt_template: String,
}

impl Default for MapReduceStrategy {
    fn default() -> Self {
        Self {
            map_agent: String::new(),
            split: SplitRule::Lines,
            reduce_prompt_template: "Merge the following partial results into a single, \
                coherent answer:\n\n{parts}"
                .to_string(),
        }
    }
}

fn split_input(rule: &SplitRule, input: &str) -> Vec<String> {
    match rule {
        SplitRule::Lines => input
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect(),
        SplitRule::Fixed(parts) => parts.clone(),
    }
}

#[async_trait::async_trait]
impl Strategy for MapReduceStrategy {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse> {
        let invoker = ctx
            .invoker
            .clone()
            .ok_or_else(|| Error::Internal("map-reduce strategy requires an agent invoker".into()))?;

        let parts = split_input(&self.split, &input.invocation.input);
        if parts.is_empty() {
            return Ok(InvocationResponse::empty());
        }

        let map_futures = parts.iter().map(|part| {
            let invoker = invoker.clone();
            let agent = self.map_agent.clone();
            let sub_invocation = Invocation {
                agent_name: agent.clone(),
                input: part.clone(),
                session_id: input.invocation.session_id.clone(),
                stream: false,
                overrides: input.invocation.overrides.clone(),
            };
            async move { invoker.invoke(&agent, sub_invocation).await }
        });

        let map_results: Vec<Result<InvocationResponse>> = join_all(map_futures).await;

        let mut turns_total = 0u32;
        let mut tokens_total = TokenUsage::default();
        let mut tool_calls_total = Vec::new();
        let mut outputs = Vec::new();
        for result in map_results {
            let resp = result?;
            turns_total += resp.turns;
            tokens_total.input += resp.tokens.input;
            tokens_total.output += resp.tokens.output;
            tool_calls_total.extend(resp.tool_calls);
            if let Some(err) = resp.error {
                return Ok(InvocationResponse {
                    output: outputs.join("\n"),
                    turns: turns_total,
                    tokens: tokens_total,
                    tool_calls: tool_calls_total,
                    error: Some(err),
                });
            }
            outputs.push(resp.output);
        }

        if outputs.len() == 1 {
            return Ok(InvocationResponse {
                output: outputs.into_iter().next().unwrap(),
                turns: turns_total,
                tokens: tokens_total,
                tool_calls: tool_calls_total,
                error: None,
            });
        }

        let joined = outputs
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}. {}", i + 1, o))
            .collect::<Vec<_>>()
            .join("\n");
        let reduce_prompt = self.reduce_prompt_template.replace("{parts}", &joined);
        let reduce_resp = ctx
            .llm
            .chat(&ChatRequest { messages: vec![Message::user(&reduce_prompt)], ..Default::default() })
            .await?;
        tokens_total.output += reduce_resp.usage.map(|u| u.completion_tokens as u64).unwrap_or(0);

        Ok(InvocationResponse {
            output: reduce_resp.content,
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
    fn splits_on_nonempty_lines() {
        let parts = split_input(&SplitRule::Lines, "a\n\nb\n  c  \n");
        assert_eq!(parts, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn fixed_split_passes_through() {
        let fixed = vec!["x".to_string(), "y".to_string()];
        let parts = split_input(&SplitRule::Fixed(fixed.clone()), "ignored");
        assert_eq!(parts, fixed);
    }
}
