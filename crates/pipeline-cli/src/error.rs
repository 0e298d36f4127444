use std::path::PathBuf;

use pipeline_engine::{ConfigError, EngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Inputs must be a JSON object of input-node id to value, got {0}")]
    InvalidInputs(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CliError {
    /// JSON report printed on failure
    pub fn report(&self) -> serde_json::Value {
        match self {
            CliError::Engine(err) => {
                serde_json::to_value(err.report()).unwrap_or_else(|_| self.plain_report())
            }
            _ => self.plain_report(),
        }
    }

    fn plain_report(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "cli",
            "message": self.to_string(),
            "nodeIds": [],
        })
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
