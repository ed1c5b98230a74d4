//! Delegation: orthogonal to strategy. Before an agent's
//! configured strategy runs, an optional auxiliary LLM call checks
//! whether the invocation should be retargeted wholesale to another
//! declared agent. On a match, the current agent's strategy is skipped
//! entirely and the retargeted agent is invoked instead.

use as_domain::tool::Message;
use as_domain::{Error, Invocation, InvocationResponse, Result};
use as_providers::traits::ChatRequest;
use as_providers::LlmProvider;

use crate::invoker::AgentInvoker;

/// One delegation rule: a plain-language condition under which the
/// invocation should be handed to `target_agent` instead of handled here.
#[derive(Debug, Clone)]
pub struct DelegationRule {
    pub target_agent: String,
    pub condition: String,
}

const NONE_MARKER: &str = "NONE";

fn delegation_prompt(input: &str, rules: &[DelegationRule]) -> String {
    let options = rules
        .iter()
        .map(|r| format!("- {}: delegate to \"{}\" if {}", r.target_agent, r.target_agent, r.condition))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the request below, decide whether it should be delegated to one of \
         the following agents. Reply with exactly one agent name if a rule matches, \
         or exactly \"{NONE_MARKER}\" if none do.\n\nRules:\n{options}\n\nRequest: {input}"
    )
}

fn match_target(classification: &str, rules: &[DelegationRule]) -> Option<String> {
    let trimmed = classification.trim();
    if trimmed.eq_ignore_ascii_case(NONE_MARKER) {
        return None;
    }
    rules
        .iter()
        .find(|r| trimmed.eq_ignore_ascii_case(&r.target_agent) || trimmed.contains(r.target_agent.as_str()))
        .map(|r| r.target_agent.clone())
}

/// Runs the delegation check for an invocation. Returns `Some(response)`
/// when a rule matched and the invocation was redirected and executed by
/// the target agent; returns `None` when no rule matched, meaning the
/// caller should proceed to run its own strategy normally.
pub async fn maybe_delegate(
    llm: &dyn LlmProvider,
    invoker: &dyn AgentInvoker,
    rules: &[DelegationRule],
    invocation: &Invocation,
) -> Result<Option<InvocationResponse>> {
    if rules.is_empty() {
        return Ok(None);
    }

    let prompt = delegation_prompt(&invocation.input, rules);
    let resp = llm
        .chat(&ChatRequest { messages: vec![Message::user(&prompt)], ..Default::default() })
        .await?;

    let Some(target) = match_target(&resp.content, rules) else {
        return Ok(None);
    };
    if target == invocation.agent_name {
        return Err(Error::Internal(format!(
            "delegation rule for agent \"{target}\" points back to itself"
        )));
    }

    let retargeted = Invocation {
        agent_name: target.clone(),
        input: invocation.input.clone(),
        session_id: invocation.session_id.clone(),
        stream: invocation.stream,
        overrides: invocation.overrides.clone(),
    };
    invoker.invoke(&target, retargeted).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<DelegationRule> {
        vec![DelegationRule { target_agent: "billing-agent".to_string(), condition: "the request is about an invoice".to_string() }]
    }

    #[test]
    fn none_marker_means_no_delegation() {
        assert_eq!(match_target("NONE", &rules()), None);
        assert_eq!(match_target("  none  ", &rules()), None);
    }

    #[test]
    fn exact_and_fuzzy_target_match() {
        assert_eq!(match_target("billing-agent", &rules()), Some("billing-agent".to_string()));
        assert_eq!(match_target("Delegate to billing-agent please", &rules()), Some("billing-agent".to_string()));
    }

    #[test]
    fn unmatched_text_is_no_delegation() {
        assert_eq!(match_target("unrelated", &rules()), None);
    }
}
