use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions & conversation memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session store + memory-strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Where sessions live: in-process only, or backed by Redis.
    #[serde(default)]
    pub backend: SessionBackend,
    /// `redis://` connection string. Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// How conversation history is kept bounded across turns.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            redis_url: None,
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

/// Conversation memory strategy: keep the last N messages verbatim
/// (`sliding_window`) or compact older turns into a running summary
/// once the transcript passes a threshold (`summary`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub strategy: MemoryStrategyKind,
    /// Sliding window: max messages kept verbatim.
    #[serde(default = "d_window")]
    pub window_messages: usize,
    /// Summary: turn count at which compaction triggers.
    #[serde(default = "d_summary_threshold")]
    pub summary_threshold_turns: usize,
    /// Summary: most-recent turns kept verbatim after compaction.
    #[serde(default = "d_summary_keep")]
    pub summary_keep_recent_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategyKind::default(),
            window_messages: d_window(),
            summary_threshold_turns: d_summary_threshold(),
            summary_keep_recent_turns: d_summary_keep(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategyKind {
    #[default]
    SlidingWindow,
    Summary,
}

fn d_window() -> usize {
    40
}
fn d_summary_threshold() -> usize {
    80
}
fn d_summary_keep() -> usize {
    12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_sliding_window_in_memory() {
        let cfg = SessionsConfig::default();
        assert_eq!(cfg.backend, SessionBackend::Memory);
        assert_eq!(cfg.memory.strategy, MemoryStrategyKind::SlidingWindow);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.memory.window_messages, 40);
    }

    #[test]
    fn deserialize_redis_backend() {
        let cfg: SessionsConfig = toml::from_str(
            r#"
            backend = "redis"
            redis_url = "redis://localhost:6379"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend, SessionBackend::Redis);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://localhost:6379"));
    }
}
