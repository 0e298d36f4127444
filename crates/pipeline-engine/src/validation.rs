//! Structural validation for pipeline graphs
//!
//! Checks id uniqueness, edge endpoints, router targets and function names.
//! Cycles are not reported here; the scheduler's dry run owns that check so
//! it can list every stuck node.

use std::collections::HashSet;

use crate::registry::FunctionRegistry;
use crate::types::{GraphDefinition, Node, NodeKind};

/// Validation issue with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge references a port the node does not declare
    UnknownPort {
        edge_id: String,
        node_id: String,
        port_id: String,
    },
    /// A router route (or default route) names a missing node
    UnknownRouteTarget { node_id: String, target: String },
    /// A function node names a function the registry does not know
    UnknownFunction { node_id: String, function_name: String },
    /// A map template node reuses the id of an outer node
    TemplateIdCollision { node_id: String, template_id: String },
    /// A retry node has neither an inline body nor a body graph id
    MissingRetryBody { node_id: String },
    /// `finalNode` names a missing node
    UnknownFinalNode { node_id: String },
}

impl ValidationIssue {
    /// Node the issue is anchored on, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateNodeId { node_id }
            | Self::UnknownNode { node_id, .. }
            | Self::UnknownPort { node_id, .. }
            | Self::UnknownRouteTarget { node_id, .. }
            | Self::UnknownFunction { node_id, .. }
            | Self::TemplateIdCollision { node_id, .. }
            | Self::MissingRetryBody { node_id }
            | Self::UnknownFinalNode { node_id } => Some(node_id),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::UnknownPort {
                edge_id,
                node_id,
                port_id,
            } => write!(
                f,
                "Edge '{}' references unknown port '{}' on node '{}'",
                edge_id, port_id, node_id
            ),
            Self::UnknownRouteTarget { node_id, target } => {
                write!(f, "Router '{}' routes to unknown node '{}'", node_id, target)
            }
            Self::UnknownFunction {
                node_id,
                function_name,
            } => write!(
                f,
                "Node '{}' calls unregistered function '{}'",
                node_id, function_name
            ),
            Self::TemplateIdCollision {
                node_id,
                template_id,
            } => write!(
                f,
                "Map '{}' template id '{}' collides with a graph node",
                node_id, template_id
            ),
            Self::MissingRetryBody { node_id } => {
                write!(f, "Retry '{}' has neither body nor bodyGraphId", node_id)
            }
            Self::UnknownFinalNode { node_id } => {
                write!(f, "finalNode references unknown node '{}'", node_id)
            }
        }
    }
}

impl std::error::Error for ValidationIssue {}

/// Validate a pipeline graph
///
/// Returns all issues found (not just the first). An empty graph is valid.
pub fn validate_graph(graph: &GraphDefinition, registry: &FunctionRegistry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let node_ids = check_unique_ids(graph, &mut issues);
    check_edges(graph, &node_ids, &mut issues);

    for node in &graph.nodes {
        check_node(node, &node_ids, registry, &mut issues);
    }

    if let Some(final_node) = &graph.final_node {
        if !node_ids.contains(final_node.as_str()) {
            issues.push(ValidationIssue::UnknownFinalNode {
                node_id: final_node.clone(),
            });
        }
    }

    issues
}

fn check_unique_ids<'a>(
    graph: &'a GraphDefinition,
    issues: &mut Vec<ValidationIssue>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(ValidationIssue::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }
    seen
}

/// Check that edge endpoints exist and that both ports are declared
fn check_edges(graph: &GraphDefinition, node_ids: &HashSet<&str>, issues: &mut Vec<ValidationIssue>) {
    for edge in &graph.edges {
        match graph.find_node(&edge.source_node_id) {
            Some(source) => {
                if !source.has_output_port(&edge.source_output_id) {
                    issues.push(ValidationIssue::UnknownPort {
                        edge_id: edge.id.clone(),
                        node_id: source.id.clone(),
                        port_id: edge.source_output_id.clone(),
                    });
                }
            }
            None => issues.push(ValidationIssue::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source_node_id.clone(),
            }),
        }

        if !node_ids.contains(edge.target_node_id.as_str()) {
            issues.push(ValidationIssue::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target_node_id.clone(),
            });
        } else if let Some(target) = graph.find_node(&edge.target_node_id) {
            if !target.has_input_port(&edge.target_input_id) {
                issues.push(ValidationIssue::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: target.id.clone(),
                    port_id: edge.target_input_id.clone(),
                });
            }
        }
    }
}

fn check_node(
    node: &Node,
    node_ids: &HashSet<&str>,
    registry: &FunctionRegistry,
    issues: &mut Vec<ValidationIssue>,
) {
    check_function(node, &node.id, registry, issues);

    match &node.kind {
        NodeKind::Router {
            routes,
            default_route,
            ..
        } => {
            for target in routes.values().chain(default_route.iter()) {
                if !node_ids.contains(target.as_str()) {
                    issues.push(ValidationIssue::UnknownRouteTarget {
                        node_id: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        NodeKind::Map { template_node, .. } => {
            if node_ids.contains(template_node.id.as_str()) {
                issues.push(ValidationIssue::TemplateIdCollision {
                    node_id: node.id.clone(),
                    template_id: template_node.id.clone(),
                });
            }
            // Reported against the map node, the template is not in the graph
            check_function(template_node, &node.id, registry, issues);
        }
        NodeKind::Retry {
            body,
            body_graph_id,
            predicate,
            ..
        } => {
            if body.is_none() && body_graph_id.is_none() {
                issues.push(ValidationIssue::MissingRetryBody {
                    node_id: node.id.clone(),
                });
            }
            if !registry.is_known(predicate) {
                issues.push(ValidationIssue::UnknownFunction {
                    node_id: node.id.clone(),
                    function_name: predicate.clone(),
                });
            }
        }
        _ => {}
    }
}

fn check_function(
    node: &Node,
    report_as: &str,
    registry: &FunctionRegistry,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(runtime) = node.kind.function_runtime() {
        if !registry.is_known(&runtime.function_name) {
            issues.push(ValidationIssue::UnknownFunction {
                node_id: report_as.to_string(),
                function_name: runtime.function_name.clone(),
            });
        }
    }
}
