use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Env var holding the API key. If unset or empty, `no_auth` must be
    /// true or every protected request gets 401.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Skip auth entirely. Dev only.
    #[serde(default)]
    pub no_auth: bool,
    /// Enable `GET /v1/metrics` (Prometheus text format).
    #[serde(default = "d_true")]
    pub metrics: bool,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Session expiry. Default 24h.
    #[serde(default = "d_session_ttl")]
    pub session_ttl_secs: u64,
    /// Invocation wall-clock timeout.
    #[serde(default = "d_invocation_timeout")]
    pub invocation_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            api_key_env: d_api_key_env(),
            no_auth: false,
            metrics: true,
            rate_limit: RateLimitConfig::default(),
            session_ttl_secs: d_session_ttl(),
            invocation_timeout_secs: d_invocation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

/// Per-key (client IP, usually) token-bucket rate limit, plus the
/// brute-force auth lockout window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests/sec per key.
    #[serde(default = "d_rate")]
    pub rate: u32,
    /// Burst capacity.
    #[serde(default = "d_burst")]
    pub burst: u32,
    /// Auth failures allowed within `lockout_window_secs` before a block.
    #[serde(default = "d_max_auth_failures")]
    pub max_auth_failures: u32,
    #[serde(default = "d_lockout_window")]
    pub lockout_window_secs: u64,
    #[serde(default = "d_lockout_duration")]
    pub lockout_duration_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: d_rate(),
            burst: d_burst(),
            max_auth_failures: d_max_auth_failures(),
            lockout_window_secs: d_lockout_window(),
            lockout_duration_secs: d_lockout_duration(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    3210
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_api_key_env() -> String {
    "AGENTSPEC_API_KEY".into()
}
fn d_true() -> bool {
    true
}
fn d_session_ttl() -> u64 {
    86_400
}
fn d_invocation_timeout() -> u64 {
    120
}
fn d_rate() -> u32 {
    10
}
fn d_burst() -> u32 {
    20
}
fn d_max_auth_failures() -> u32 {
    10
}
fn d_lockout_window() -> u64 {
    60
}
fn d_lockout_duration() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_localhost() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 3210);
        assert!(!cfg.no_auth);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.rate_limit.rate, 10);
        assert_eq!(cfg.session_ttl_secs, 86_400);
    }

    #[test]
    fn no_auth_overridable() {
        let cfg: ServerConfig = toml::from_str("no_auth = true\n").unwrap();
        assert!(cfg.no_auth);
    }
}
