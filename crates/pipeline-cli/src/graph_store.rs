//! Graph registry backed by a directory of JSON files
//!
//! Every `*.json` file in the directory holds one `GraphDefinition` and is
//! registered under the graph's own `id`, not its file name.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use pipeline_engine::{GraphDefinition, GraphRegistry};
use tokio::fs;

use crate::error::{CliError, Result};

pub struct DirectoryGraphRegistry {
    graphs: HashMap<String, GraphDefinition>,
}

impl DirectoryGraphRegistry {
    /// Load every graph file under `root`
    pub async fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut graphs = HashMap::new();

        let mut entries = fs::read_dir(&root).await.map_err(|source| CliError::Io {
            path: root.clone(),
            source,
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|source| CliError::Io {
            path: root.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let graph = read_graph(&path).await?;
            if let Some(previous) = graphs.insert(graph.id.clone(), graph) {
                log::warn!(
                    "Graph '{}' defined more than once in {:?}; keeping {:?}",
                    previous.id,
                    root,
                    path
                );
            }
        }

        log::info!("Loaded {} graphs from {:?}", graphs.len(), root);
        Ok(Self { graphs })
    }
}

#[async_trait]
impl GraphRegistry for DirectoryGraphRegistry {
    async fn get(&self, graph_id: &str) -> Option<GraphDefinition> {
        self.graphs.get(graph_id).cloned()
    }
}

/// Read and parse one graph definition file
pub async fn read_graph(path: &Path) -> Result<GraphDefinition> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
