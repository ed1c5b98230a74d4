use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for an agent resource that the orchestrator can invoke
/// directly or that another agent can delegate to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Resolved system prompt content (prompt resources are flattened to
    /// plain text by the time they reach this config; templating itself
    /// is out of scope here).
    #[serde(default)]
    pub system_prompt: String,
    /// Which agentic-loop strategy this agent runs.
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Tool allow/deny policy.
    #[serde(default)]
    pub tool_policy: ToolPolicy,
    /// Role->model mapping (e.g. `{ executor = "gpt-4o-mini" }`).
    /// Overrides the global `[llm.roles]` for this agent.
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Fan-out / recursion limits for delegation.
    #[serde(default)]
    pub limits: AgentLimits,
    /// Per-invocation token budget. `None` = inherit the server default.
    #[serde(default)]
    pub token_budget: Option<u64>,
    /// Maximum turns in the agentic loop before it is cut off.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    /// Delegation rules checked before this agent's own strategy runs.
    #[serde(default)]
    pub delegation: Vec<DelegationRuleConfig>,
    /// Declared sub-agents a `MapReduce` strategy fans out to. Unused by
    /// other strategies.
    #[serde(default)]
    pub map_reduce_targets: Vec<String>,
}

fn d_max_turns() -> u32 {
    25
}

/// One delegation rule: a plain-language condition under which the
/// invocation is retargeted wholesale to `target_agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRuleConfig {
    pub target_agent: String,
    pub condition: String,
}

/// Strategy used to drive an agent's turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    ReAct,
    PlanExecute,
    Reflexion,
    Router,
    MapReduce,
}

/// Hard ceilings on multi-agent fan-out to prevent runaway trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLimits {
    /// Maximum nesting depth (parent -> child -> grandchild).
    /// A top-level delegation is depth=1; its child delegating is depth=2.
    #[serde(default = "d_3")]
    pub max_depth: u32,
    /// Maximum number of delegate calls within a single parent turn.
    #[serde(default = "d_5")]
    pub max_children_per_turn: u32,
    /// Wall-clock timeout per child run (milliseconds). 0 = no limit.
    #[serde(default = "d_30000")]
    pub max_duration_ms: u64,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_children_per_turn: 5,
            max_duration_ms: 30_000,
        }
    }
}

/// Tool allow/deny policy — prefix-based matching.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// Tool name prefixes this agent may use. `["*"]` or empty = unrestricted.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool name prefixes this agent is denied (evaluated before allow).
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ToolPolicy {
    /// Check whether the given tool name is permitted by this policy.
    ///
    /// Matching is case-insensitive. Deny always wins over allow.
    pub fn allows(&self, tool_name: &str) -> bool {
        let name = tool_name.to_ascii_lowercase();

        for d in &self.deny {
            let d_lower = d.to_ascii_lowercase();
            if d_lower == "*" || name == d_lower || name.starts_with(&format!("{d_lower}.")) {
                return false;
            }
        }
        if self.allow.is_empty() || self.allow.iter().any(|a| a == "*") {
            return true;
        }
        for a in &self.allow {
            let a_lower = a.to_ascii_lowercase();
            if name == a_lower || name.starts_with(&format!("{a_lower}.")) {
                return true;
            }
        }
        false
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3() -> u32 {
    3
}
fn d_5() -> u32 {
    5
}
fn d_30000() -> u64 {
    30_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
