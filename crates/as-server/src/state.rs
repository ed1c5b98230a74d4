//! `AppState`, grouped by concern the way the teacher's gateway state is:
//! core services, agents/pipelines, tools, and security.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use as_domain::config::Config;
use as_mcp::McpManager;
use as_memory::store::SessionStore;
use as_providers::ProviderRegistry;
use as_runtime::estimator::TokenEstimator;
use as_runtime::pipeline::Dag;
use as_runtime::strategy::Strategy;
use as_secrets::SecretRegistry;
use as_tools::Registry;

use crate::metrics::Metrics;
use crate::process_adapter::LocalProcessAdapter;
use crate::rate_limit::{AuthLockout, RateLimiter};

/// Distinguishes "auth intentionally off" from "auth on but misconfigured",
/// which an `Option<Vec<u8>>` collapses into the same `None` and would let
/// the misconfigured case silently allow every request (spec §4.10: "If no
/// key is configured and `no_auth` is false, every protected request
/// returns 401").
#[derive(Clone)]
pub enum AuthMode {
    /// `no_auth = true`: every protected request is let through.
    Disabled,
    /// `no_auth = false` and a key is configured: compared in constant time.
    Key(Vec<u8>),
    /// `no_auth = false` but the key env var is unset or empty: deny all.
    DenyAll,
}

/// Everything needed to run one declared agent: its config, the
/// resolved strategy implementation, the LLM client it calls, and the
/// memory strategy governing its session history.
pub struct AgentRuntime {
    pub config: as_domain::config::AgentConfig,
    pub strategy: Arc<dyn Strategy>,
    pub llm: Arc<dyn as_providers::LlmProvider>,
    pub memory: Arc<dyn as_memory::memory_strategy::MemoryStrategy>,
    pub estimator: Arc<dyn TokenEstimator>,
}

#[derive(Clone)]
pub struct AppState {
    // ── Core services ────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub mcp: Arc<McpManager>,
    pub secrets: Arc<SecretRegistry>,

    // ── Agents & pipelines ───────────────────────────────────────
    pub agents: Arc<HashMap<String, AgentRuntime>>,
    pub pipelines: Arc<HashMap<String, Dag>>,

    // ── Sessions & tools ─────────────────────────────────────────
    pub sessions: Arc<dyn SessionStore>,
    pub tools: Arc<Registry>,

    // ── Deployment ───────────────────────────────────────────────
    pub process_adapter: Arc<LocalProcessAdapter>,

    // ── Security ─────────────────────────────────────────────────
    pub auth_mode: AuthMode,
    pub auth_lockout: Arc<AuthLockout>,
    pub rate_limiter: Arc<RateLimiter>,

    // ── Metrics & misc ───────────────────────────────────────────
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
}
