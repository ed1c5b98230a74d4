use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Token budgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-invocation token budget configuration consumed by the agentic
/// loop (`Strategy` implementations check remaining budget before each
/// LLM call and fail the turn with `Error::BudgetExhausted` once spent).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BudgetConfig {
    /// Default token budget applied to any agent without a per-agent entry.
    /// `None` = uncapped.
    #[serde(default)]
    pub default_tokens: Option<u64>,
    /// Per-agent overrides keyed by agent id.
    #[serde(default)]
    pub per_agent: HashMap<String, AgentBudget>,
}

impl BudgetConfig {
    /// Resolve the effective token budget for an agent, falling back to
    /// the server default when no per-agent override exists.
    pub fn for_agent(&self, agent_id: &str) -> Option<u64> {
        self.per_agent
            .get(agent_id)
            .map(|b| b.tokens)
            .unwrap_or(self.default_tokens)
    }
}

/// Token budget override for a specific agent. `tokens = None` means
/// this agent is explicitly uncapped even if a server default exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBudget {
    pub tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_uncapped() {
        let cfg = BudgetConfig::default();
        assert_eq!(cfg.for_agent("planner"), None);
    }

    #[test]
    fn falls_back_to_default() {
        let mut cfg = BudgetConfig::default();
        cfg.default_tokens = Some(100_000);
        assert_eq!(cfg.for_agent("planner"), Some(100_000));
    }

    #[test]
    fn per_agent_overrides_default() {
        let mut cfg = BudgetConfig::default();
        cfg.default_tokens = Some(100_000);
        cfg.per_agent.insert(
            "planner".into(),
            AgentBudget { tokens: Some(5_000) },
        );
        assert_eq!(cfg.for_agent("planner"), Some(5_000));
        assert_eq!(cfg.for_agent("other"), Some(100_000));
    }

    #[test]
    fn per_agent_explicit_uncapped() {
        let mut cfg = BudgetConfig::default();
        cfg.default_tokens = Some(100_000);
        cfg.per_agent.insert("planner".into(), AgentBudget { tokens: None });
        assert_eq!(cfg.for_agent("planner"), None);
    }
}
