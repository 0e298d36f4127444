//! Core types for pipeline graphs
//!
//! These types define the structure of pipeline graphs: nodes, edges,
//! ports and the per-kind configuration carried by each node.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for a port
pub type PortId = String;

/// Output port used when a node declares none
pub const DEFAULT_OUTPUT_PORT: &str = "output";

/// Whether a port carries data or only sequencing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    #[default]
    Data,
    Control,
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Unique identifier for this port within its node
    pub id: PortId,
    /// Human-readable label
    #[serde(default)]
    pub name: String,
    /// Free-form value type tag ("string", "list", "any", ...)
    #[serde(default = "default_value_type")]
    pub value_type: String,
    #[serde(default)]
    pub kind: PortKind,
}

fn default_value_type() -> String {
    "any".to_string()
}

impl Port {
    /// Create a data port accepting any value
    pub fn data(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            value_type: default_value_type(),
            kind: PortKind::Data,
        }
    }

    /// Create a control (sequencing-only) port
    pub fn control(id: impl Into<String>) -> Self {
        Self {
            kind: PortKind::Control,
            ..Self::data(id)
        }
    }

    /// Set the value type tag
    pub fn typed(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }
}

/// Runtime configuration for an LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRuntime {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// Runtime configuration for a registered function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRuntime {
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Static options handed to the function next to its inputs
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl FunctionRuntime {
    pub fn named(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            input_schema: None,
            output_schema: None,
            options: Map::new(),
        }
    }
}

/// Runtime of a processor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Runtime {
    Llm(LlmRuntime),
    Function(FunctionRuntime),
}

/// Per-kind node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Seeded from the run's initial inputs
    Input,
    /// Records its resolved inputs as the run's output
    Output,
    /// LLM call or registered function
    Processor { runtime: Runtime },
    /// Shorthand for a processor with a function runtime
    Function(FunctionRuntime),
    /// Runs `template_node` once per item of `input_list_ref`
    #[serde(rename_all = "camelCase")]
    Map {
        input_list_ref: String,
        template_node: Box<Node>,
    },
    /// Selects one of `routes` by the resolved `condition`
    #[serde(rename_all = "camelCase")]
    Router {
        condition: String,
        routes: BTreeMap<String, NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_route: Option<NodeId>,
    },
    /// Re-runs a sub-pipeline until `predicate` answers `ok`
    #[serde(rename_all = "camelCase")]
    Retry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Box<GraphDefinition>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body_graph_id: Option<String>,
        predicate: String,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
}

fn default_max_attempts() -> u32 {
    3
}

impl NodeKind {
    /// Short type tag used in events and logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Processor {
                runtime: Runtime::Llm(_),
            } => "processor:llm",
            Self::Processor {
                runtime: Runtime::Function(_),
            } => "processor:function",
            Self::Function(_) => "function",
            Self::Map { .. } => "map",
            Self::Router { .. } => "router",
            Self::Retry { .. } => "retry",
        }
    }

    /// Function runtime, for both `processor` and `function` nodes
    pub fn function_runtime(&self) -> Option<&FunctionRuntime> {
        match self {
            Self::Processor {
                runtime: Runtime::Function(f),
            }
            | Self::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node instance
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    /// Input port id -> template resolved against the context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<PortId, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            inputs: Vec::new(),
            outputs: Vec::new(),
            bindings: BTreeMap::new(),
            timeout_ms: None,
            kind,
        }
    }

    /// Port a single-valued result is recorded under
    pub fn primary_output(&self) -> &str {
        self.outputs
            .first()
            .map(|p| p.id.as_str())
            .unwrap_or(DEFAULT_OUTPUT_PORT)
    }

    pub fn has_input_port(&self, port_id: &str) -> bool {
        self.inputs.iter().any(|p| p.id == port_id)
    }

    pub fn has_output_port(&self, port_id: &str) -> bool {
        self.outputs.iter().any(|p| p.id == port_id)
    }

    /// Every template string owned by this node (bindings, prompts,
    /// condition, list reference). The map template node is not included.
    pub fn templates(&self) -> Vec<&str> {
        let mut templates: Vec<&str> = self.bindings.values().map(String::as_str).collect();
        match &self.kind {
            NodeKind::Processor {
                runtime: Runtime::Llm(llm),
            } => {
                templates.push(&llm.user_prompt);
                if let Some(system) = &llm.system_prompt {
                    templates.push(system);
                }
            }
            NodeKind::Map { input_list_ref, .. } => templates.push(input_list_ref),
            NodeKind::Router { condition, .. } => templates.push(condition),
            _ => {}
        }
        templates
    }

    /// Wrap a single value under this node's primary output port
    pub fn single_output(&self, value: Value) -> Value {
        let mut map = Map::new();
        map.insert(self.primary_output().to_string(), value);
        Value::Object(map)
    }

    /// Whether `value` is already a port-keyed output for this node: a
    /// non-empty object whose keys are all output ports (or the primary
    /// port when none are declared)
    pub fn is_port_map(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) if !map.is_empty() => map.keys().all(|key| {
                self.has_output_port(key) || (self.outputs.is_empty() && key == DEFAULT_OUTPUT_PORT)
            }),
            _ => false,
        }
    }
}

/// An edge connecting two ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_output_id: PortId,
    pub target_node_id: NodeId,
    pub target_input_id: PortId,
}

/// A complete pipeline graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    /// Node whose output is the run's single designated result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_node: Option<NodeId>,
}

impl GraphDefinition {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Index of every node by id
    pub fn node_index(&self) -> HashMap<&str, &Node> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target_node_id == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source_node_id == node_id)
    }

    pub fn input_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| matches!(n.kind, NodeKind::Input))
    }

    pub fn output_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| matches!(n.kind, NodeKind::Output))
    }

    /// Whether dependencies come from edges rather than templates
    pub fn uses_edges(&self) -> bool {
        !self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_from_json() {
        let node: Node = serde_json::from_value(json!({
            "id": "writer",
            "type": "processor",
            "runtime": {
                "type": "llm",
                "provider": "local",
                "model": "tiny",
                "userPrompt": "Write about {{outputs.topic.output}}",
                "temperature": 0.2
            },
            "outputs": [{"id": "text"}]
        }))
        .unwrap();

        assert_eq!(node.kind.type_name(), "processor:llm");
        assert_eq!(node.primary_output(), "text");
        assert_eq!(node.templates(), vec!["Write about {{outputs.topic.output}}"]);
        assert_eq!(node.outputs[0].value_type, "any");
    }

    #[test]
    fn test_router_and_map_from_json() {
        let graph: GraphDefinition = serde_json::from_value(json!({
            "id": "g",
            "nodes": [
                {
                    "id": "branch",
                    "type": "router",
                    "condition": "{{outputs.judge.output}}",
                    "routes": {"Yes": "combat", "No": "peaceful"}
                },
                {
                    "id": "each",
                    "type": "map",
                    "inputListRef": "{{outputs.list.items}}",
                    "templateNode": {
                        "id": "item-writer",
                        "type": "function",
                        "functionName": "core:join"
                    }
                }
            ]
        }))
        .unwrap();

        assert!(!graph.uses_edges());
        match &graph.nodes[0].kind {
            NodeKind::Router { routes, default_route, .. } => {
                assert_eq!(routes.get("Yes").map(String::as_str), Some("combat"));
                assert!(default_route.is_none());
            }
            other => panic!("expected router, got {:?}", other),
        }
        match &graph.nodes[1].kind {
            NodeKind::Map { template_node, .. } => {
                assert_eq!(
                    template_node.kind.function_runtime().map(|f| f.function_name.as_str()),
                    Some("core:join")
                );
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_graph_edges() {
        let mut graph = GraphDefinition::new("test", "Test Graph");
        graph.nodes.push(Node::new("node1", NodeKind::Input));
        graph.nodes.push(Node::new("node2", NodeKind::Output));
        graph.edges.push(Edge {
            id: "edge1".to_string(),
            source_node_id: "node1".to_string(),
            source_output_id: "output".to_string(),
            target_node_id: "node2".to_string(),
            target_input_id: "input".to_string(),
        });

        assert!(graph.uses_edges());
        assert_eq!(graph.incoming_edges("node2").count(), 1);
        assert_eq!(graph.outgoing_edges("node1").count(), 1);
        assert_eq!(graph.input_nodes().count(), 1);
        assert_eq!(graph.output_nodes().count(), 1);
    }

    #[test]
    fn test_port_map_detection() {
        let bare = Node::new("input", NodeKind::Input);
        assert!(bare.is_port_map(&json!({"output": "text"})));
        assert!(!bare.is_port_map(&json!({"name": "Ash"})));
        assert!(!bare.is_port_map(&json!({})));
        assert!(!bare.is_port_map(&json!("text")));

        let mut declared = Node::new("input", NodeKind::Input);
        declared.outputs.push(Port::data("text"));
        declared.outputs.push(Port::data("meta"));
        assert!(declared.is_port_map(&json!({"text": "a", "meta": 1})));
        assert!(!declared.is_port_map(&json!({"output": "a"})));
    }
}
