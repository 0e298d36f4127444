//! Lookup of stored graphs for sub-pipeline calls.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::types::GraphDefinition;

/// Source of graph definitions referenced by id
#[async_trait]
pub trait GraphRegistry: Send + Sync {
    async fn get(&self, graph_id: &str) -> Option<GraphDefinition>;
}

/// Graph registry held in memory
#[derive(Default)]
pub struct InMemoryGraphRegistry {
    graphs: RwLock<HashMap<String, GraphDefinition>>,
}

impl InMemoryGraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a graph under its own id, replacing any previous one
    pub fn insert(&self, graph: GraphDefinition) {
        if let Ok(mut graphs) = self.graphs.write() {
            graphs.insert(graph.id.clone(), graph);
        }
    }

    /// Builder-style insert
    pub fn with_graph(self, graph: GraphDefinition) -> Self {
        self.insert(graph);
        self
    }

    pub fn len(&self) -> usize {
        self.graphs.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GraphRegistry for InMemoryGraphRegistry {
    async fn get(&self, graph_id: &str) -> Option<GraphDefinition> {
        self.graphs.read().ok()?.get(graph_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = InMemoryGraphRegistry::new().with_graph(GraphDefinition::new("sub", "Sub"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("sub").await.map(|g| g.name), Some("Sub".to_string()));
        assert!(registry.get("missing").await.is_none());
    }
}
