//! Command-line surface. Grounded on the gateway's `cli/mod.rs`
//! `Cli`/`Command`/`load_config` shape, narrowed from its dozen
//! subcommands down to `serve` (the default) and the state-plane shims
//! (`plan`/`apply`/`drift`/`export`) spec §6 calls out by name, plus
//! `config validate`/`config show`.

use std::path::PathBuf;

use as_domain::config::{Config, ConfigSeverity};
use as_domain::resource::{Resource, StateFile};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "agentspec", version, about = "AgentSpec runtime server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Compute a plan against a compiled resource graph, without applying it.
    Plan {
        /// Path to a JSON file holding the compiled resource graph (`Vec<Resource>`).
        #[arg(long)]
        resources: PathBuf,
    },
    /// Apply a compiled resource graph via the local process adapter.
    Apply {
        #[arg(long)]
        resources: PathBuf,
    },
    /// Report drift between a compiled resource graph and the realized state.
    Drift {
        #[arg(long)]
        resources: PathBuf,
        /// Emit machine-readable JSON instead of tab-separated text.
        #[arg(long)]
        json: bool,
    },
    /// Print the realized state file as pretty JSON.
    Export,
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any validation issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
    /// Authenticate an OAuth device-flow provider (currently OpenAI Codex).
    Login {
        /// The `id` of the provider in `llm.providers`, e.g. "openai-codex".
        provider_id: String,
    },
}

/// Look up a provider by id and confirm it uses the OAuth device flow.
///
/// The provider's `kind` (not `auth.mode`, which governs how a *resolved*
/// token is attached to requests) is the source of truth for whether it
/// needs this flow — currently only [`ProviderKind::OpenaiCodexOauth`].
pub fn find_oauth_provider<'a>(
    config: &'a Config,
    provider_id: &str,
) -> anyhow::Result<&'a as_domain::config::ProviderConfig> {
    let provider = config
        .llm
        .providers
        .iter()
        .find(|p| p.id == provider_id)
        .ok_or_else(|| {
            let available: Vec<&str> = config.llm.providers.iter().map(|p| p.id.as_str()).collect();
            anyhow::anyhow!("provider '{provider_id}' not found in config (available: {available:?})")
        })?;

    if provider.kind != as_domain::config::ProviderKind::OpenaiCodexOauth {
        anyhow::bail!(
            "provider '{provider_id}' does not use the OAuth device flow (kind: {:?})",
            provider.kind
        );
    }

    Ok(provider)
}

/// Load the configuration from the path named by `AGENTSPEC_CONFIG` (or
/// `config.toml` by default). Falls back to `Config::default()` if the
/// file doesn't exist, so a bare `agentspec serve` works out of the box.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("AGENTSPEC_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw =
            std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// Print validation issues, one per line, prefixed by severity.
/// Returns `false` if any issue is an error.
pub fn validate_config(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }
    let ok = !issues.iter().any(|i| i.severity == ConfigSeverity::Error);
    if ok {
        println!("{config_path}: configuration is valid");
    } else {
        println!("{config_path}: configuration has errors");
    }
    ok
}

pub fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

pub fn load_resources(path: &PathBuf) -> anyhow::Result<Vec<Resource>> {
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

pub fn state_path(_config: &Config) -> PathBuf {
    std::env::var("AGENTSPEC_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("agentspec-state.json"))
}

/// Load the realized state as a plain `Vec<StateEntry>`, treating a
/// missing file as an empty state (spec §8 boundary behavior).
pub fn load_state_entries(backend: &as_state::StateBackend) -> anyhow::Result<Vec<as_domain::resource::StateEntry>> {
    Ok(backend.load()?)
}

pub fn state_file_json(entries: &[as_domain::resource::StateEntry]) -> anyhow::Result<String> {
    let file = StateFile::new(entries.to_vec());
    Ok(serde_json::to_string_pretty(&file)?)
}
