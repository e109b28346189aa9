//! Runtime configuration.
//!
//! Values come from environment variables with sensible defaults, so the
//! server runs out of the box and tests construct configs directly.

use std::time::Duration;

/// Model invocation settings shared by all three call modes.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier sent to the backend.
    pub model: String,
    /// Max output tokens for direct and tool-augmented calls.
    pub max_tokens: u32,
    /// Max output tokens for extended-reasoning calls.
    pub reasoning_max_tokens: u32,
    /// Internal deliberation budget for extended-reasoning calls.
    pub thinking_budget: u32,
    /// Sampling temperature for direct calls.
    pub temperature: f64,
    /// Upper bound on tool-augmented conversation turns.
    pub max_tool_turns: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            reasoning_max_tokens: 16000,
            thinking_budget: 10000,
            temperature: 0.4,
            max_tool_turns: 5,
        }
    }
}

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of context snippets retrieved per run.
    pub retrieval_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { retrieval_top_k: 20 }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub dev_mode: bool,
    /// Poll cadence of the progress stream against the run store.
    pub stream_poll_interval: Duration,
    /// Hard cap on a progress stream's lifetime, independent of run state.
    pub stream_max_lifetime: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            dev_mode: false,
            stream_poll_interval: Duration::from_millis(1500),
            stream_max_lifetime: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub model: ModelConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("BUCKETCREW_MODEL") {
            config.model.model = model;
        }
        if let Some(turns) = env_parse::<u32>("BUCKETCREW_MAX_TOOL_TURNS") {
            config.model.max_tool_turns = turns;
        }
        if let Some(budget) = env_parse::<u32>("BUCKETCREW_THINKING_BUDGET") {
            config.model.thinking_budget = budget;
        }
        if let Some(top_k) = env_parse::<usize>("BUCKETCREW_RETRIEVAL_TOP_K") {
            config.engine.retrieval_top_k = top_k;
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            config.server.port = port;
        }
        if let Some(ms) = env_parse::<u64>("BUCKETCREW_STREAM_POLL_MS") {
            config.server.stream_poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("BUCKETCREW_STREAM_MAX_SECS") {
            config.server.stream_max_lifetime = Duration::from_secs(secs);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_settings() {
        let config = Config::default();
        assert_eq!(config.engine.retrieval_top_k, 20);
        assert_eq!(config.model.max_tool_turns, 5);
        assert_eq!(
            config.server.stream_poll_interval,
            Duration::from_millis(1500)
        );
        assert_eq!(
            config.server.stream_max_lifetime,
            Duration::from_secs(300)
        );
    }
}
