//! Assembles a [`Config`] and its collaborators into a running
//! [`AppState`] (spec §4.13's "assemble a Server from compiled config +
//! collaborators; lifecycle"). Grounded on the gateway's `main.rs`
//! `run_server` sequence — read config, build each owned service in
//! dependency order, wire them into one state struct — generalized from
//! a single fixed service set to the spec's declarative
//! agents/tools/pipelines/deploy-targets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use as_domain::config::{Config, ToolTransportConfig};
use as_mcp::McpManager;
use as_memory::memory_strategy::{LlmSummarizer, MemoryStrategy, SlidingWindowStrategy, SummaryStrategy};
use as_memory::store::SessionStore;
use as_memory::{InMemoryStore, RedisStore};
use as_providers::ProviderRegistry;
use as_runtime::estimator::HeuristicEstimator;
use as_runtime::pipeline::{build_dag, Dag, Step, StepInput};
use as_secrets::resolver::{EnvResolver, VaultResolver};
use as_secrets::SecretRegistry;
use as_tools::command_executor::{CommandExecutor, CommandToolConfig};
use as_tools::http_executor::{HttpExecutor, HttpToolConfig};
use as_tools::inline_executor::{InlineExecutor, InlineToolConfig};
use as_tools::mcp_executor::McpExecutor;
use as_tools::registry::ToolExecutor;
use as_tools::Registry;
use sha2::{Digest, Sha256};

use crate::metrics::Metrics;
use crate::process_adapter::LocalProcessAdapter;
use crate::rate_limit::{AuthLockout, RateLimiter};
use crate::state::{AgentRuntime, AppState, AuthMode};
use crate::strategy_select;

/// Build the full [`AppState`] from a validated [`Config`]. Callers are
/// expected to have already run `config.validate()` and aborted on any
/// `ConfigSeverity::Error`.
pub async fn bootstrap(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Secret plane ─────────────────────────────────────────────────
    let secret_registry = Arc::new(SecretRegistry::new());
    let env_resolver = EnvResolver;
    let vault_resolver = match (&config.secrets.vault_base_url, &config.secrets.vault_token_env) {
        (Some(base_url), Some(token_env)) => {
            let token = as_secrets::resolver::resolve(
                &format!("env({token_env})"),
                &env_resolver,
                None,
                &secret_registry,
            )
            .await
            .map_err(|e| anyhow::anyhow!("resolving vault token: {e}"))?;
            Some(VaultResolver::new(
                base_url.clone(),
                token,
                Duration::from_secs(config.secrets.vault_cache_ttl_secs),
            ))
        }
        _ => None,
    };

    // ── LLM providers ────────────────────────────────────────────────
    let providers =
        ProviderRegistry::from_config(&config.llm).map_err(|e| anyhow::anyhow!("initializing LLM providers: {e}"))?;
    let llm = Arc::new(providers);
    if llm.is_empty() {
        tracing::warn!("no LLM providers initialized — agent invocations will fail until credentials are configured");
    }

    // ── MCP pool ─────────────────────────────────────────────────────
    let mcp = Arc::new(McpManager::from_config(&config.mcp));
    mcp.clone().spawn_reaper(Duration::from_secs(30));

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions: Arc<dyn SessionStore> = match config.sessions.backend {
        as_domain::config::SessionBackend::Memory => Arc::new(InMemoryStore::new()),
        as_domain::config::SessionBackend::Redis => {
            let url = config
                .sessions
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("sessions.backend = redis requires sessions.redis_url"))?;
            Arc::new(
                RedisStore::connect(url)
                    .await
                    .map_err(|e| anyhow::anyhow!("connecting to redis: {e}"))?,
            )
        }
    };

    // ── Tool registry ────────────────────────────────────────────────
    let mut registry = Registry::new();
    for (name, decl) in &config.tool_defs {
        let definition = as_domain::tool::ToolDefinition {
            name: name.clone(),
            description: decl.description.clone(),
            parameters: decl.parameters.clone(),
        };
        let mut env = HashMap::new();
        let executor: Arc<dyn ToolExecutor> = match &decl.transport {
            ToolTransportConfig::Command { binary, args, env: decl_env } => {
                for (k, v) in decl_env {
                    env.insert(k.clone(), resolve_maybe_secret(v, &env_resolver, vault_resolver.as_ref(), &secret_registry).await?);
                }
                Arc::new(CommandExecutor::new(CommandToolConfig {
                    binary: binary.clone(),
                    args: args.clone(),
                    allowlist: config.tools.exec_security.binary_allowlist.clone(),
                    env,
                    timeout: Duration::from_secs(config.tools.exec.timeout_sec),
                }))
            }
            ToolTransportConfig::Http { method, url, headers, body_template } => {
                let mut resolved_headers = HashMap::new();
                for (k, v) in headers {
                    resolved_headers.insert(
                        k.clone(),
                        resolve_maybe_secret(v, &env_resolver, vault_resolver.as_ref(), &secret_registry).await?,
                    );
                }
                Arc::new(HttpExecutor::new(HttpToolConfig {
                    method: method.clone(),
                    url: url.clone(),
                    headers: resolved_headers,
                    body_template: body_template.clone(),
                    timeout: Duration::from_secs(config.tools.http.timeout_sec),
                }))
            }
            ToolTransportConfig::Inline { interpreter, interpreter_flags, source, env: decl_env } => {
                for (k, v) in decl_env {
                    env.insert(k.clone(), resolve_maybe_secret(v, &env_resolver, vault_resolver.as_ref(), &secret_registry).await?);
                }
                Arc::new(InlineExecutor::new(InlineToolConfig {
                    interpreter: interpreter.clone(),
                    interpreter_flags: interpreter_flags.clone(),
                    source: source.clone(),
                    env,
                    timeout: Duration::from_secs(config.tools.exec.timeout_sec),
                    memory_cap_bytes: config.tools.exec.inline_memory_cap_bytes,
                    workdir: None,
                }))
            }
            ToolTransportConfig::Mcp { server, tool } => Arc::new(McpExecutor::new(mcp.clone(), server.clone(), tool.clone())),
        };
        registry.register(name.clone(), definition, executor);
    }
    let tools = Arc::new(registry);

    // ── Agents ───────────────────────────────────────────────────────
    let mut agents = HashMap::new();
    for (name, agent_cfg) in &config.agents {
        let llm_client = resolve_agent_llm(&llm, agent_cfg, &config)?;
        let strategy = strategy_select::resolve(agent_cfg);
        let memory = build_memory_strategy(&config.sessions.memory, llm_client.clone());
        agents.insert(
            name.clone(),
            AgentRuntime {
                config: agent_cfg.clone(),
                strategy,
                llm: llm_client,
                memory,
                estimator: Arc::new(HeuristicEstimator),
            },
        );
    }
    let agents = Arc::new(agents);

    // ── Pipelines ────────────────────────────────────────────────────
    let mut pipelines = HashMap::new();
    for (name, pipeline_cfg) in &config.pipelines {
        let steps = pipeline_cfg
            .steps
            .iter()
            .map(|s| Step {
                name: s.name.clone(),
                agent: s.agent.clone(),
                depends_on: s.depends_on.clone(),
                input: parse_step_input(&s.input),
            })
            .collect();
        let dag: Dag = build_dag(steps).map_err(|e| anyhow::anyhow!("pipeline \"{name}\": {e}"))?;
        pipelines.insert(name.clone(), dag);
    }
    let pipelines = Arc::new(pipelines);

    // ── Deploy targets / local process adapter ──────────────────────
    let process_adapter = Arc::new(LocalProcessAdapter::new(config.deploy_targets.clone()));

    // ── Security ─────────────────────────────────────────────────────
    let auth_mode = if config.server.no_auth {
        AuthMode::Disabled
    } else {
        match std::env::var(&config.server.api_key_env) {
            Ok(key) if !key.is_empty() => AuthMode::Key(Sha256::digest(key.as_bytes()).to_vec()),
            _ => {
                tracing::warn!(
                    env_var = %config.server.api_key_env,
                    "API key auth misconfigured (no_auth=false but env var unset) — every protected request will 401"
                );
                AuthMode::DenyAll
            }
        }
    };

    let auth_lockout = Arc::new(AuthLockout::new(
        config.server.rate_limit.max_auth_failures,
        config.server.rate_limit.lockout_window_secs,
        config.server.rate_limit.lockout_duration_secs,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(config.server.rate_limit.rate, config.server.rate_limit.burst));

    Ok(AppState {
        config,
        llm,
        mcp,
        secrets: secret_registry,
        agents,
        pipelines,
        sessions,
        tools,
        process_adapter,
        auth_mode,
        auth_lockout,
        rate_limiter,
        metrics: Arc::new(Metrics::new()),
        started_at: Instant::now(),
    })
}

async fn resolve_maybe_secret(
    raw: &str,
    env: &EnvResolver,
    vault: Option<&VaultResolver>,
    registry: &SecretRegistry,
) -> anyhow::Result<String> {
    if as_secrets::resolver::SecretRef::parse(raw).is_ok() {
        as_secrets::resolver::resolve(raw, env, vault, registry)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))
    } else {
        Ok(raw.to_string())
    }
}

/// Resolve which registered [`LlmProvider`] an agent calls: its own
/// `models["executor"]` override, falling back to the server-wide
/// `[llm.roles.executor]`, falling back to the first registered
/// provider so a single-provider config never needs role wiring at all.
fn resolve_agent_llm(
    registry: &Arc<ProviderRegistry>,
    agent_cfg: &as_domain::config::AgentConfig,
    config: &Config,
) -> anyhow::Result<Arc<dyn as_providers::LlmProvider>> {
    let model_spec = agent_cfg
        .models
        .get("executor")
        .cloned()
        .or_else(|| config.llm.roles.get("executor").map(|r| r.model.clone()));

    if let Some(spec) = model_spec {
        let provider_id = spec.split('/').next().unwrap_or(&spec);
        if let Some(provider) = registry.get(provider_id) {
            return Ok(provider);
        }
    }

    registry
        .iter()
        .next()
        .map(|(_, p)| p.clone())
        .ok_or_else(|| anyhow::anyhow!("no LLM provider available for agent (none configured or resolvable)"))
}

fn build_memory_strategy(
    cfg: &as_domain::config::MemoryConfig,
    llm: Arc<dyn as_providers::LlmProvider>,
) -> Arc<dyn MemoryStrategy> {
    match cfg.strategy {
        as_domain::config::MemoryStrategyKind::SlidingWindow => {
            Arc::new(SlidingWindowStrategy { window: cfg.window_messages })
        }
        as_domain::config::MemoryStrategyKind::Summary => Arc::new(SummaryStrategy {
            threshold: cfg.summary_threshold_turns,
            summarize_batch: cfg.summary_threshold_turns.saturating_sub(cfg.summary_keep_recent_turns).max(1),
            summarizer: Arc::new(LlmSummarizer { llm }),
        }),
    }
}

fn parse_step_input(raw: &str) -> StepInput {
    if raw == "trigger" {
        StepInput::TriggerInput
    } else if let Some(step_name) = raw.strip_prefix("step:") {
        StepInput::StepOutput(step_name.to_string())
    } else {
        StepInput::Literal(raw.to_string())
    }
}
