use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deploy targets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A deploy target realized by the local process adapter: a single
/// long-lived runtime subprocess, started/stopped/health-checked by
/// `as_server::process_adapter::LocalProcessAdapter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTargetConfig {
    /// Binary to spawn.
    pub runtime_binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Port written into `runtime-config.json` and polled for `/healthz`.
    pub port: u16,
    #[serde(default = "d_health_path")]
    pub health_path: String,
    #[serde(default = "d_health_timeout")]
    pub health_timeout_secs: u64,
}

fn d_health_path() -> String {
    "/healthz".into()
}

fn d_health_timeout() -> u64 {
    30
}
