use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools (command / inline / http executors)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration shared by the built-in executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
    #[serde(default)]
    pub http: HttpExecutorConfig,
}

/// Command/inline executor process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Default yield time in ms before auto-backgrounding (0 = always foreground).
    #[serde(default = "d_10000")]
    pub background_ms: u64,
    /// Hard wall-clock timeout for a command/inline call (seconds).
    #[serde(default = "d_1800")]
    pub timeout_sec: u64,
    /// TTL for finished process sessions before cleanup (ms).
    #[serde(default = "d_1800000")]
    pub cleanup_ms: u64,
    /// Max output chars kept per process session.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
    /// Max pending output chars buffered before drain.
    #[serde(default = "d_500000")]
    pub pending_max_output_chars: usize,
    /// Notify when a background process exits.
    #[serde(default = "d_true")]
    pub notify_on_exit: bool,
    /// Skip notification if exit code is 0 and output is empty.
    #[serde(default)]
    pub notify_on_exit_empty_success: bool,
    /// Memory cap (bytes) applied to inline-executor subprocesses via rlimit
    /// on Unix. Best-effort no-op on platforms without rlimit support.
    #[serde(default = "d_mem_cap")]
    pub inline_memory_cap_bytes: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            background_ms: 10_000,
            timeout_sec: 1800,
            cleanup_ms: 1_800_000,
            max_output_chars: 1_000_000,
            pending_max_output_chars: 500_000,
            notify_on_exit: true,
            notify_on_exit_empty_success: false,
            inline_memory_cap_bytes: d_mem_cap(),
        }
    }
}

/// Security configuration for the command executor: audit logging, a
/// regex denylist, and an explicit binary allowlist. A command whose
/// resolved argv[0] basename is not in `binary_allowlist` is rejected
/// with `Error::NoAllowlist`/`Error::BinaryNotAllowed` before it runs —
/// the denylist is a second, independent layer, not a substitute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSecurityConfig {
    /// Log every exec invocation at INFO level.
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Regex patterns that are denied outright.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
    /// Binaries the command executor is permitted to run, matched against
    /// argv[0]'s basename. Empty means no binary may run (fail closed).
    #[serde(default = "d_binary_allowlist")]
    pub binary_allowlist: Vec<String>,
}

impl Default for ExecSecurityConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            denied_patterns: d_denied_patterns(),
            binary_allowlist: d_binary_allowlist(),
        }
    }
}

/// HTTP executor configuration: response size cap and SSRF guard toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpExecutorConfig {
    #[serde(default = "d_http_timeout")]
    pub timeout_sec: u64,
    #[serde(default = "d_http_max_body")]
    pub max_response_bytes: usize,
    /// Reject requests resolving to private/loopback/link-local/ULA/
    /// cloud-metadata addresses. Disabling this is for trusted
    /// internal-network deployments only.
    #[serde(default = "d_true")]
    pub ssrf_guard: bool,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_sec: d_http_timeout(),
            max_response_bytes: d_http_max_body(),
            ssrf_guard: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_10000() -> u64 {
    10_000
}
fn d_1800() -> u64 {
    1800
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_1000000() -> usize {
    1_000_000
}
fn d_500000() -> usize {
    500_000
}
fn d_true() -> bool {
    true
}
fn d_mem_cap() -> u64 {
    512 * 1024 * 1024
}
fn d_http_timeout() -> u64 {
    30
}
fn d_http_max_body() -> usize {
    10 * 1024 * 1024
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}
fn d_binary_allowlist() -> Vec<String> {
    vec![
        "sh".into(),
        "bash".into(),
        "cat".into(),
        "ls".into(),
        "grep".into(),
        "echo".into(),
        "curl".into(),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Declared tools (one entry per name in `tool_defs`, bound to a registry
// executor at bootstrap). Distinct from `ToolsConfig` above, which only
// holds the shared per-transport settings (timeouts, allowlists, etc).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default = "d_empty_schema")]
    pub parameters: serde_json::Value,
    #[serde(flatten)]
    pub transport: ToolTransportConfig,
}

fn d_empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ToolTransportConfig {
    Command {
        binary: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: std::collections::HashMap<String, String>,
    },
    Http {
        method: String,
        url: String,
        #[serde(default)]
        headers: std::collections::HashMap<String, String>,
        #[serde(default)]
        body_template: Option<String>,
    },
    Inline {
        interpreter: String,
        #[serde(default)]
        interpreter_flags: Vec<String>,
        source: String,
        #[serde(default)]
        env: std::collections::HashMap<String, String>,
    },
    /// Dispatched to `<server>/<tool>` via the MCP pool rather than a
    /// locally-configured executor.
    Mcp {
        server: String,
        tool: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_decl_command_deserializes() {
        let toml = r#"
            description = "list files"
            transport = "command"
            binary = "ls"
            args = ["-la"]
        "#;
        let decl: ToolDeclConfig = toml::from_str(toml).unwrap();
        match decl.transport {
            ToolTransportConfig::Command { binary, .. } => assert_eq!(binary, "ls"),
            _ => panic!("expected command transport"),
        }
    }

    #[test]
    fn tool_decl_mcp_deserializes() {
        let toml = r#"
            transport = "mcp"
            server = "fs"
            tool = "read_file"
        "#;
        let decl: ToolDeclConfig = toml::from_str(toml).unwrap();
        match decl.transport {
            ToolTransportConfig::Mcp { server, tool } => {
                assert_eq!(server, "fs");
                assert_eq!(tool, "read_file");
            }
            _ => panic!("expected mcp transport"),
        }
    }

    #[test]
    fn default_allowlist_is_non_empty() {
        let cfg = ExecSecurityConfig::default();
        assert!(!cfg.binary_allowlist.is_empty());
    }

    #[test]
    fn empty_allowlist_deserializes() {
        let cfg: ExecSecurityConfig = toml::from_str("binary_allowlist = []\n").unwrap();
        assert!(cfg.binary_allowlist.is_empty());
    }

    #[test]
    fn http_ssrf_guard_defaults_on() {
        let cfg = HttpExecutorConfig::default();
        assert!(cfg.ssrf_guard);
    }
}
