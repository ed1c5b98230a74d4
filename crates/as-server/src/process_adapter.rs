//! Local process adapter (spec §4.4's `Adapter` seam, realized against a
//! single long-lived runtime subprocess per deploy target). Grounded on
//! the tools crate's `ProcessManager`/`exec.rs` spawn pattern, scoped
//! down from its interactive multi-session model to one tracked child
//! per target: spawn, poll `/healthz`, graceful-restart on update,
//! terminate on delete.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use as_domain::config::DeployTargetConfig;
use as_domain::resource::{Action, ActionType};
use as_state::Adapter;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::{Child, Command};

struct Running {
    child: Child,
}

/// Tracks one spawned subprocess per deploy target, keyed by the
/// target's FQN. A single adapter instance is shared across the
/// server's lifetime, so state lives behind a mutex rather than
/// `&mut self` on `apply`.
pub struct LocalProcessAdapter {
    targets: HashMap<String, DeployTargetConfig>,
    running: Mutex<HashMap<String, Running>>,
}

impl LocalProcessAdapter {
    pub fn new(targets: HashMap<String, DeployTargetConfig>) -> Self {
        Self {
            targets,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Stop every tracked subprocess. Called on server shutdown.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, Running)> = self.running.lock().drain().collect();
        for (fqn, running) in entries {
            stop(fqn, running).await;
        }
    }

    fn target_for(&self, fqn: &str) -> Option<&DeployTargetConfig> {
        // FQNs are `<pkg>/DeployTarget/<name>`; targets are keyed by name.
        let name = fqn.rsplit('/').next().unwrap_or(fqn);
        self.targets.get(name)
    }

    async fn spawn_target(&self, fqn: &str, cfg: &DeployTargetConfig) -> Result<(), String> {
        let mut cmd = Command::new(&cfg.runtime_binary);
        cmd.args(&cfg.args)
            .env("PORT", cfg.port.to_string())
            .envs(&cfg.env)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null());

        let child = cmd.spawn().map_err(|e| format!("failed to spawn {}: {e}", cfg.runtime_binary))?;
        wait_healthy(cfg).await?;

        self.running.lock().insert(fqn.to_string(), Running { child });
        Ok(())
    }
}

async fn wait_healthy(cfg: &DeployTargetConfig) -> Result<(), String> {
    let url = format!("http://127.0.0.1:{}{}", cfg.port, cfg.health_path);
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(cfg.health_timeout_secs);

    loop {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("{} did not become healthy within {}s", url, cfg.health_timeout_secs));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn stop(fqn: String, mut running: Running) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = running.child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    let graceful = tokio::time::timeout(Duration::from_secs(5), running.child.wait()).await;
    if graceful.is_err() {
        tracing::warn!(fqn = %fqn, "deploy target did not exit after SIGTERM, killing");
        let _ = running.child.start_kill();
        let _ = running.child.wait().await;
    }
}

#[async_trait]
impl Adapter for LocalProcessAdapter {
    fn name(&self) -> &str {
        "local_process"
    }

    async fn apply(&self, action: &Action) -> Result<(), String> {
        match action.action_type {
            ActionType::Noop => Ok(()),
            ActionType::Create | ActionType::Update => {
                let cfg = self
                    .target_for(&action.fqn)
                    .ok_or_else(|| format!("no deploy target config for {}", action.fqn))?
                    .clone();

                if action.action_type == ActionType::Update {
                    if let Some(running) = self.running.lock().remove(&action.fqn) {
                        stop(action.fqn.clone(), running).await;
                    }
                }
                self.spawn_target(&action.fqn, &cfg).await
            }
            ActionType::Delete => {
                if let Some(running) = self.running.lock().remove(&action.fqn) {
                    stop(action.fqn.clone(), running).await;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_for_strips_fqn_prefix() {
        let mut targets = HashMap::new();
        targets.insert(
            "api".to_string(),
            DeployTargetConfig {
                runtime_binary: "true".into(),
                args: vec![],
                env: HashMap::new(),
                port: 9999,
                health_path: "/healthz".into(),
                health_timeout_secs: 1,
            },
        );
        let adapter = LocalProcessAdapter::new(targets);
        assert!(adapter.target_for("demo/DeployTarget/api").is_some());
        assert!(adapter.target_for("missing").is_none());
    }
}
