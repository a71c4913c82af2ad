//! Configuration for the orchestration engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the whole agent pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Primary model for tool-capable requests.
    pub primary_model: String,
    /// Fallback pool, tried one model per failed exchange, round-robin.
    pub fallback_models: Vec<String>,
    /// Token budget for primary requests.
    pub max_tokens: u32,
    /// Reduced token budget for fallback requests.
    pub fallback_max_tokens: u32,
    /// Maximum tool-call follow-up rounds before the exchange is degraded.
    pub max_tool_depth: usize,
    /// Delay between searches when the model supplies multiple queries.
    #[serde(with = "duration_serde")]
    pub search_stagger: Duration,
    /// How many recent platform messages to normalize.
    pub history_limit: usize,
    /// Admission guard settings.
    pub guard: GuardConfig,
    /// Media analysis cache settings.
    pub cache: MediaCacheConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            primary_model: "qwen-qwq-32b".to_string(),
            fallback_models: vec![
                "deepseek-r1".to_string(),
                "deepseek-r1-distill-llama-70b".to_string(),
                "llama3.1-405b-instruct".to_string(),
            ],
            max_tokens: 8000,
            fallback_max_tokens: 1024,
            max_tool_depth: 5,
            search_stagger: Duration::from_millis(500),
            history_limit: 10,
            guard: GuardConfig::default(),
            cache: MediaCacheConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary model.
    #[must_use]
    pub fn with_primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = model.into();
        self
    }

    /// Set the fallback model pool.
    #[must_use]
    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Set the maximum tool-call depth.
    #[must_use]
    pub const fn with_max_tool_depth(mut self, depth: usize) -> Self {
        self.max_tool_depth = depth;
        self
    }

    /// Set the history window size.
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// Admission guard settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Minimum quiet period between replies to the same conversation.
    #[serde(with = "duration_serde")]
    pub quiet_period: Duration,
    /// Simulated typing delay before the pipeline runs.
    #[serde(with = "duration_serde")]
    pub typing_delay: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(30),
            typing_delay: Duration::from_secs(3),
        }
    }
}

/// Media analysis cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaCacheConfig {
    /// Entry lifetime, measured from creation.
    #[serde(with = "duration_serde")]
    pub ttl: Duration,
    /// Interval of the background purge sweep.
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
    /// Snapshot file; `None` keeps the cache memory-only.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            snapshot_path: None,
        }
    }
}

impl MediaCacheConfig {
    /// Set the entry TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the snapshot file path.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }
}

/// Serde module for `Duration` as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.max_tool_depth, 5);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.guard.quiet_period, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(86_400));
        assert_eq!(config.fallback_models.len(), 3);
    }

    #[test]
    fn test_config_builder() {
        let config = AgentConfig::new()
            .with_primary_model("test-model")
            .with_max_tool_depth(2)
            .with_history_limit(5);
        assert_eq!(config.primary_model, "test-model");
        assert_eq!(config.max_tool_depth, 2);
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn test_duration_roundtrip() {
        let config = AgentConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: AgentConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.search_stagger, config.search_stagger);
        assert_eq!(back.guard.typing_delay, config.guard.typing_delay);
    }
}
