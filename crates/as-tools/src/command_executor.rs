//! Command executor: runs an allowlisted binary with a
//! scrubbed environment, feeding the call's input as JSON on stdin and
//! capturing stdout under the same cap as the HTTP executor.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::http_executor::MAX_RESPONSE_BYTES;
use crate::registry::ToolExecutor;

#[derive(Debug, Clone)]
pub struct CommandToolConfig {
    pub binary: String,
    pub args: Vec<String>,
    /// Binaries permitted to run. An empty or missing allowlist is a
    /// configuration error, not an empty-permission default — every
    /// invocation is refused with `no_allowlist`.
    pub allowlist: Vec<String>,
    /// Extra environment entries beyond `PATH`/`HOME` (e.g. resolved
    /// secrets declared for this tool).
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

pub struct CommandExecutor {
    config: CommandToolConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandToolConfig) -> Self {
        Self { config }
    }
}

/// Build a scrubbed environment: only `PATH`, `HOME`, and explicitly
/// declared entries pass through.
pub fn scrubbed_env(declared: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    if let Ok(path) = std::env::var("PATH") {
        env.insert("PATH".to_string(), path);
    }
    if let Ok(home) = std::env::var("HOME") {
        env.insert("HOME".to_string(), home);
    }
    for (k, v) in declared {
        env.insert(k.clone(), v.clone());
    }
    env
}

#[async_trait::async_trait]
impl ToolExecutor for CommandExecutor {
    async fn execute(&self, input: Value) -> (String, Option<String>) {
        if self.config.allowlist.is_empty() {
            return (String::new(), Some("no binary allowlist configured".to_string()));
        }
        if !self.config.allowlist.iter().any(|b| b == &self.config.binary) {
            return (
                String::new(),
                Some(format!("binary not allowed: {}", self.config.binary)),
            );
        }

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.args)
            .env_clear()
            .envs(scrubbed_env(&self.config.env))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (String::new(), Some(format!("binary not found: {}", self.config.binary)));
            }
            Err(e) => return (String::new(), Some(format!("failed to spawn: {e}"))),
        };

        if let Some(mut stdin) = child.stdin.take() {
            let payload = input.to_string();
            let _ = stdin.write_all(payload.as_bytes()).await;
            drop(stdin);
        }

        let run = async {
            let mut stdout = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = out.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    let remaining = MAX_RESPONSE_BYTES.saturating_sub(stdout.len());
                    if remaining == 0 {
                        break;
                    }
                    stdout.extend_from_slice(&buf[..n.min(remaining)]);
                }
            }
            let status = child.wait().await;
            (stdout, status)
        };

        match tokio::time::timeout(self.config.timeout, run).await {
            Ok((stdout, Ok(status))) => {
                let text = String::from_utf8_lossy(&stdout).to_string();
                if status.success() {
                    (text, None)
                } else {
                    (text, Some(format!("exit status {status}")))
                }
            }
            Ok((stdout, Err(e))) => (
                String::from_utf8_lossy(&stdout).to_string(),
                Some(format!("failed waiting for process: {e}")),
            ),
            Err(_) => {
                let _ = child.start_kill();
                (String::new(), Some(format!("command '{}' timed out", self.config.binary)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_allowlist_refuses_any_binary() {
        let executor = CommandExecutor::new(CommandToolConfig {
            binary: "echo".into(),
            args: vec![],
            allowlist: vec![],
            env: HashMap::new(),
            timeout: Duration::from_secs(1),
        });
        let (_, err) = executor.execute(serde_json::json!({})).await;
        assert_eq!(err.unwrap(), "no binary allowlist configured");
    }

    #[tokio::test]
    async fn binary_not_in_allowlist_is_refused() {
        let executor = CommandExecutor::new(CommandToolConfig {
            binary: "rm".into(),
            args: vec![],
            allowlist: vec!["echo".into()],
            env: HashMap::new(),
            timeout: Duration::from_secs(1),
        });
        let (_, err) = executor.execute(serde_json::json!({})).await;
        assert!(err.unwrap().contains("binary not allowed"));
    }

    #[tokio::test]
    async fn allowlisted_binary_runs() {
        let executor = CommandExecutor::new(CommandToolConfig {
            binary: "echo".into(),
            args: vec!["hi".into()],
            allowlist: vec!["echo".into()],
            env: HashMap::new(),
            timeout: Duration::from_secs(5),
        });
        let (out, err) = executor.execute(serde_json::json!({})).await;
        assert!(err.is_none());
        assert_eq!(out.trim(), "hi");
    }
}
