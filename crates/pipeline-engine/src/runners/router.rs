//! Conditional branching
//!
//! A router resolves its condition to a key and picks one route. Every other
//! route target is skipped, and skipping spreads to any node whose
//! dependencies were all skipped.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::dependency::DependencyGraph;
use crate::error::{EngineError, Result};
use crate::template;
use crate::types::{Node, NodeId, NodeKind};

/// Branch picked by a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub selected: NodeId,
    pub rejected: Vec<NodeId>,
}

pub struct RouterRunner;

#[async_trait]
impl NodeRunner for RouterRunner {
    async fn run(
        &self,
        node: &Node,
        _inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        let NodeKind::Router {
            condition,
            routes,
            default_route,
        } = &node.kind
        else {
            return Err(EngineError::failed(format!("'{}' is not a router", node.id)));
        };

        let key = match template::resolve(condition, env.context) {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        let selected = match routes.get(&key) {
            Some(target) => target.clone(),
            None => match default_route {
                Some(fallback) => {
                    log::debug!("Router '{}' key '{}' fell back to default route", node.id, key);
                    fallback.clone()
                }
                None => return Err(EngineError::NoMatchingRoute(key)),
            },
        };

        let mut rejected: Vec<NodeId> = Vec::new();
        for target in routes.values().chain(default_route.iter()) {
            if *target != selected && !rejected.contains(target) {
                rejected.push(target.clone());
            }
        }

        log::debug!("Router '{}' selected '{}'", node.id, selected);
        Ok(NodeOutcome::routed(
            node.single_output(Value::String(key)),
            RouteDecision { selected, rejected },
        ))
    }
}

/// Branch skip bookkeeping for one run
#[derive(Debug, Default)]
pub struct BranchSkips {
    selected: HashSet<NodeId>,
    rejected: HashSet<NodeId>,
    skipped: Vec<NodeId>,
}

impl BranchSkips {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, decision: RouteDecision) {
        self.rejected.extend(decision.rejected);
        self.selected.insert(decision.selected);
    }

    /// Whether `node_id` should be skipped: rejected by a router and chosen by
    /// none, or every one of its dependencies was skipped
    pub fn should_skip(&self, node_id: &str, deps: &DependencyGraph) -> bool {
        if self.rejected.contains(node_id) && !self.selected.contains(node_id) {
            return true;
        }
        let dependencies = deps.dependencies_of(node_id);
        !dependencies.is_empty() && dependencies.iter().all(|d| self.is_skipped(d))
    }

    pub fn mark_skipped(&mut self, node_id: &str) {
        self.skipped.push(node_id.to_string());
    }

    pub fn is_skipped(&self, node_id: &str) -> bool {
        self.skipped.iter().any(|s| s == node_id)
    }

    /// Skipped node ids in the order they were skipped
    pub fn into_skipped(self) -> Vec<NodeId> {
        self.skipped
    }
}
