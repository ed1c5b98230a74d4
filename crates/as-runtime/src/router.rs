//! Router strategy: a classifier call chooses a target
//! sub-agent by name; its response is returned as-is. Selects a
//! declared *agent*, not a model/provider.

use as_domain::tool::Message;
use as_domain::{Error, Invocation, InvocationResponse, Result};
use as_providers::traits::ChatRequest;

use crate::strategy::{Strategy, StrategyContext, StrategyInput};

/// The set of agent names the router may pick among, with a one-line
/// description of each used to prompt the classifier.
#[derive(Debug, Clone, Default)]
pub struct RouterStrategy {
    pub targets: Vec<(String, String)>,
}

fn classify_prompt(input: &str, targets: &[(String, String)]) -> String {
    let options = targets
        .iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Choose the single best-matching agent for this request, replying with \
         just its name and nothing else.\n\nAgents:\n{options}\n\nRequest: {input}"
    )
}

fn extract_agent_name(classification: &str, targets: &[(String, String)]) -> Option<String> {
    let trimmed = classification.trim();
    targets
        .iter()
        .find(|(name, _)| trimmed.eq_ignore_ascii_case(name))
        .map(|(name, _)| name.clone())
        .or_else(|| {
            targets
                .iter()
                .find(|(name, _)| trimmed.contains(name.as_str()))
                .map(|(name, _)| name.clone())
        })
}

#[async_trait::async_trait]
impl Strategy for RouterStrategy {
    async fn execute(&self, ctx: &StrategyContext, input: StrategyInput<'_>) -> Result<InvocationResponse> {
        let invoker = ctx
            .invoker
            .clone()
            .ok_or_else(|| Error::Internal("router strategy requires an agent invoker".into()))?;

        let prompt = classify_prompt(&input.invocation.input, &self.targets);
        let classify_resp = ctx
            .llm
            .chat(&ChatRequest { messages: vec![Message::user(&prompt)], ..Default::default() })
            .await?;

        let Some(target) = extract_agent_name(&classify_resp.content, &self.targets) else {
            return Err(Error::NotFound(format!(
                "router could not match a target agent from classification: {}",
                classify_resp.content
            )));
        };

        let sub_invocation = Invocation {
            agent_name: target.clone(),
            input: input.invocation.input.clone(),
            session_id: input.invocation.session_id.clone(),
            stream: false,
            overrides: input.invocation.overrides.clone(),
        };
        invoker.invoke(&target, sub_invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_exact_match() {
        let targets = vec![("billing".to_string(), "handles invoices".to_string()), ("support".to_string(), "general help".to_string())];
        assert_eq!(extract_agent_name("billing", &targets), Some("billing".into()));
        assert_eq!(extract_agent_name("  Support  ", &targets), Some("support".into()));
    }

    #[test]
    fn extracts_substring_match_when_model_adds_text() {
        let targets = vec![("billing".to_string(), "handles invoices".to_string())];
        assert_eq!(extract_agent_name("I'll route this to billing.", &targets), Some("billing".into()));
    }

    #[test]
    fn no_match_returns_none() {
        let targets = vec![("billing".to_string(), "handles invoices".to_string())];
        assert_eq!(extract_agent_name("unrelated text", &targets), None);
    }
}
