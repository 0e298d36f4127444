//! Fluent builder for pipeline graphs
//!
//! Provides a fluent API for constructing graphs programmatically.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{
    Edge, FunctionRuntime, GraphDefinition, LlmRuntime, Node, NodeKind, Port, Runtime,
};

/// Fluent builder for constructing pipeline graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("story")
///     .input("topic")
///     .llm("writer", "Write a story about {{outputs.topic.output}}")
///     .output("result")
///     .with_binding("story", "{{outputs.writer.output}}")
///     .build();
/// ```
pub struct GraphBuilder {
    graph: GraphDefinition,
    edge_counter: usize,
}

impl GraphBuilder {
    /// Create a new graph builder; the name defaults to the id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            graph: GraphDefinition::new(id.clone(), id),
            edge_counter: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.graph.name = name.into();
        self
    }

    /// Add an arbitrary node
    pub fn node(mut self, node: Node) -> Self {
        self.graph.nodes.push(node);
        self
    }

    /// Add an input node
    pub fn input(self, id: impl Into<String>) -> Self {
        self.node(Node::new(id, NodeKind::Input))
    }

    /// Add an output node
    pub fn output(self, id: impl Into<String>) -> Self {
        self.node(Node::new(id, NodeKind::Output))
    }

    /// Add an LLM processor with default provider settings
    pub fn llm(self, id: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        self.llm_with(
            id,
            LlmRuntime {
                provider: "default".to_string(),
                model: "default".to_string(),
                system_prompt: None,
                user_prompt: user_prompt.into(),
                temperature: 0.7,
            },
        )
    }

    /// Add an LLM processor with an explicit runtime
    pub fn llm_with(self, id: impl Into<String>, runtime: LlmRuntime) -> Self {
        self.node(Node::new(
            id,
            NodeKind::Processor {
                runtime: Runtime::Llm(runtime),
            },
        ))
    }

    /// Add a function node
    pub fn function(self, id: impl Into<String>, runtime: FunctionRuntime) -> Self {
        self.node(Node::new(id, NodeKind::Function(runtime)))
    }

    /// Add a map node running `template` once per list item
    pub fn map(
        self,
        id: impl Into<String>,
        input_list_ref: impl Into<String>,
        template: Node,
    ) -> Self {
        self.node(Node::new(
            id,
            NodeKind::Map {
                input_list_ref: input_list_ref.into(),
                template_node: Box::new(template),
            },
        ))
    }

    /// Add a router node
    pub fn router<'a>(
        self,
        id: impl Into<String>,
        condition: impl Into<String>,
        routes: impl IntoIterator<Item = (&'a str, &'a str)>,
        default_route: Option<&str>,
    ) -> Self {
        let routes: BTreeMap<String, String> = routes
            .into_iter()
            .map(|(key, target)| (key.to_string(), target.to_string()))
            .collect();
        self.node(Node::new(
            id,
            NodeKind::Router {
                condition: condition.into(),
                routes,
                default_route: default_route.map(str::to_string),
            },
        ))
    }

    /// Add a retry node with an inline body graph
    pub fn retry(
        self,
        id: impl Into<String>,
        body: GraphDefinition,
        predicate: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        self.node(Node::new(
            id,
            NodeKind::Retry {
                body: Some(Box::new(body)),
                body_graph_id: None,
                predicate: predicate.into(),
                max_attempts,
            },
        ))
    }

    /// Add a retry node whose body is looked up in the graph registry
    pub fn retry_graph(
        self,
        id: impl Into<String>,
        body_graph_id: impl Into<String>,
        predicate: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        self.node(Node::new(
            id,
            NodeKind::Retry {
                body: None,
                body_graph_id: Some(body_graph_id.into()),
                predicate: predicate.into(),
                max_attempts,
            },
        ))
    }

    /// Bind an input port of the most recently added node to a template
    pub fn with_binding(mut self, port: impl Into<String>, template: impl Into<String>) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.bindings.insert(port.into(), template.into());
        }
        self
    }

    /// Declare an input port on the most recently added node
    pub fn with_input_port(mut self, port: impl Into<String>) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.inputs.push(Port::data(port));
        }
        self
    }

    /// Declare an output port on the most recently added node
    pub fn with_output_port(mut self, port: impl Into<String>) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.outputs.push(Port::data(port));
        }
        self
    }

    /// Set a time budget on the most recently added node
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.timeout_ms = Some(timeout_ms);
        }
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn edge(
        mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        self.graph.edges.push(Edge {
            id: format!("edge-{}", self.edge_counter),
            source_node_id: source.into(),
            source_output_id: source_port.into(),
            target_node_id: target.into(),
            target_input_id: target_port.into(),
        });
        self
    }

    /// Set a shared variable
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.graph.variables.insert(name.into(), value);
        self
    }

    /// Designate the node whose output is the run's final output
    pub fn final_node(mut self, node_id: impl Into<String>) -> Self {
        self.graph.final_node = Some(node_id.into());
        self
    }

    /// Build the graph without validation
    /// Finish the graph, declaring any port an edge wires that its node
    /// does not already declare
    pub fn build(mut self) -> GraphDefinition {
        let GraphDefinition { nodes, edges, .. } = &mut self.graph;
        for edge in edges.iter() {
            if let Some(source) = nodes.iter_mut().find(|n| n.id == edge.source_node_id) {
                if !source.has_output_port(&edge.source_output_id) {
                    source.outputs.push(Port::data(edge.source_output_id.clone()));
                }
            }
            if let Some(target) = nodes.iter_mut().find(|n| n.id == edge.target_node_id) {
                if !target.has_input_port(&edge.target_input_id) {
                    target.inputs.push(Port::data(edge.target_input_id.clone()));
                }
            }
        }
        self.graph
    }
}
