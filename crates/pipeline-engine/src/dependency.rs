//! Dependency resolution
//!
//! Derives the execution DAG for one run. A graph with edges takes its
//! dependencies from the edges alone; a graph without edges scans every
//! template a node owns for `outputs.<nodeId>` references. Router targets
//! depend on their router in both modes so the branch decision exists before
//! a target could start.
//!
//! Cycles are not rejected here; see [`WaveScheduler::plan`](crate::WaveScheduler::plan).

use std::collections::HashMap;

use serde::Serialize;

use crate::config::MapScope;
use crate::template;
use crate::types::{GraphDefinition, Node, NodeId, NodeKind};

/// Where a graph's dependencies came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencySource {
    Edges,
    Templates,
}

/// Adjacency list and in-degree map for one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Node ids in definition order
    nodes: Vec<NodeId>,
    /// node -> nodes that depend on it
    adjacency: HashMap<NodeId, Vec<NodeId>>,
    /// node -> nodes it depends on
    dependencies: HashMap<NodeId, Vec<NodeId>>,
    in_degree: HashMap<NodeId, usize>,
    source: DependencySource,
}

impl DependencyGraph {
    /// Build the DAG for a graph
    pub fn build(graph: &GraphDefinition, map_scope: MapScope) -> Self {
        let source = if graph.uses_edges() {
            DependencySource::Edges
        } else {
            DependencySource::Templates
        };

        let mut deps = Self {
            nodes: Vec::with_capacity(graph.nodes.len()),
            adjacency: HashMap::new(),
            dependencies: HashMap::new(),
            in_degree: HashMap::new(),
            source,
        };
        for node in &graph.nodes {
            if deps.in_degree.contains_key(&node.id) {
                continue;
            }
            deps.nodes.push(node.id.clone());
            deps.adjacency.insert(node.id.clone(), Vec::new());
            deps.dependencies.insert(node.id.clone(), Vec::new());
            deps.in_degree.insert(node.id.clone(), 0);
        }

        match source {
            DependencySource::Edges => {
                for edge in &graph.edges {
                    deps.add(&edge.source_node_id, &edge.target_node_id);
                }
            }
            DependencySource::Templates => {
                for node in &graph.nodes {
                    for referenced in template_references(node, map_scope) {
                        if deps.in_degree.contains_key(&referenced) {
                            deps.add(&referenced, &node.id);
                        } else {
                            log::debug!(
                                "Node '{}' references unknown node '{}'; ignoring",
                                node.id,
                                referenced
                            );
                        }
                    }
                }
            }
        }

        for node in &graph.nodes {
            if let NodeKind::Router {
                routes,
                default_route,
                ..
            } = &node.kind
            {
                for target in routes.values().chain(default_route.iter()) {
                    if target != &node.id {
                        deps.add(&node.id, target);
                    }
                }
            }
        }

        deps
    }

    /// Record that `dependent` depends on `dependency`. Unknown ids and
    /// repeated pairs are ignored.
    fn add(&mut self, dependency: &str, dependent: &str) {
        if !self.in_degree.contains_key(dependency) || !self.in_degree.contains_key(dependent) {
            return;
        }
        let Some(existing) = self.dependencies.get_mut(dependent) else {
            return;
        };
        if existing.iter().any(|d| d == dependency) {
            return;
        }
        existing.push(dependency.to_string());
        if let Some(dependents) = self.adjacency.get_mut(dependency) {
            dependents.push(dependent.to_string());
        }
        if let Some(degree) = self.in_degree.get_mut(dependent) {
            *degree += 1;
        }
    }

    pub fn source(&self) -> DependencySource {
        self.source
    }

    /// Node ids in definition order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn adjacency(&self) -> &HashMap<NodeId, Vec<NodeId>> {
        &self.adjacency
    }

    pub fn in_degrees(&self) -> &HashMap<NodeId, usize> {
        &self.in_degree
    }

    pub fn in_degree(&self, node_id: &str) -> usize {
        self.in_degree.get(node_id).copied().unwrap_or(0)
    }

    /// Nodes that depend on `node_id`
    pub fn dependents_of(&self, node_id: &str) -> &[NodeId] {
        self.adjacency.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes `node_id` depends on
    pub fn dependencies_of(&self, node_id: &str) -> &[NodeId] {
        self.dependencies
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Node ids referenced by a node's own templates. Under `inherit-outputs`
/// the map template node's references count too, since the item scope can
/// read outer outputs.
fn template_references(node: &Node, map_scope: MapScope) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = Vec::new();
    let mut scan = |templates: Vec<&str>| {
        for t in templates {
            for id in template::references(t) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    };

    scan(node.templates());
    if let NodeKind::Map { template_node, .. } = &node.kind {
        if map_scope == MapScope::InheritOutputs {
            scan(template_node.templates());
        }
    }
    ids
}
