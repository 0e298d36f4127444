//! Engine configuration
//!
//! Tunables for concurrency, timeouts and loop/nesting limits. Stored as a
//! camelCase JSON file; every field has a default, so a partial (or missing)
//! file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

/// What a map item's scope can see besides its item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MapScope {
    /// Outer variables plus `item` and `index`
    #[default]
    VariablesOnly,
    /// Also a snapshot of the outer outputs; the template node's outer
    /// references become dependencies of the map node
    InheritOutputs,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum map items in flight at once
    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,
    #[serde(default)]
    pub map_scope: MapScope,
    /// Budget for a single LLM call in milliseconds
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_ms: u64,
    /// Upper bound applied to every retry node's `maxAttempts`
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Maximum nesting of sub-pipelines (runGraph, map items, retry bodies)
    #[serde(default = "default_max_subgraph_depth")]
    pub max_subgraph_depth: usize,
}

fn default_map_concurrency() -> usize {
    8
}

fn default_llm_timeout() -> u64 {
    120_000
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_max_subgraph_depth() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            map_concurrency: default_map_concurrency(),
            map_scope: MapScope::default(),
            llm_timeout_ms: default_llm_timeout(),
            max_retry_attempts: default_max_retry_attempts(),
            max_subgraph_depth: default_max_subgraph_depth(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;
        let config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Engine configuration saved to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.map_concurrency == 0 {
            return Err(ConfigError::Invalid("mapConcurrency must be at least 1".into()));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid("maxRetryAttempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
