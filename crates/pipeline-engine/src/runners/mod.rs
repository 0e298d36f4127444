//! Per-kind node runners
//!
//! Each [`NodeKind`] maps to one runner. A runner receives the node, its
//! resolved inputs and a read-only view of the run, and returns the value to
//! record. Runners never write to the context themselves; the executor
//! records every output after the wave joins.

mod function;
mod llm;
mod map;
mod passthrough;
mod retry;
mod router;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::GraphExecutor;
use crate::template;
use crate::types::{GraphDefinition, Node, NodeKind, Runtime};

pub use function::FunctionRunner;
pub use llm::LlmRunner;
pub use map::MapRunner;
pub use passthrough::{InputRunner, OutputRunner};
pub use retry::RetryRunner;
pub use router::{BranchSkips, RouteDecision, RouterRunner};

/// What a runner hands back to the executor
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    /// Value to record; `None` when the output was seeded before the run
    pub output: Option<Value>,
    /// Branch decision made by a router
    pub route: Option<RouteDecision>,
}

impl NodeOutcome {
    pub fn recorded(output: Value) -> Self {
        Self {
            output: Some(output),
            route: None,
        }
    }

    pub fn seeded() -> Self {
        Self {
            output: None,
            route: None,
        }
    }

    pub fn routed(output: Value, decision: RouteDecision) -> Self {
        Self {
            output: Some(output),
            route: Some(decision),
        }
    }
}

/// Read-only view of the run handed to every runner
pub struct RunnerEnv<'a> {
    pub executor: &'a GraphExecutor,
    pub graph: &'a GraphDefinition,
    pub context: &'a ExecutionContext,
    pub cancel: &'a CancellationToken,
    pub execution_id: &'a str,
}

/// Strategy for executing one kind of node
#[async_trait]
pub trait NodeRunner: Send + Sync {
    async fn run(
        &self,
        node: &Node,
        inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome>;
}

static INPUT: InputRunner = InputRunner;
static OUTPUT: OutputRunner = OutputRunner;
static FUNCTION: FunctionRunner = FunctionRunner;
static LLM: LlmRunner = LlmRunner;
static MAP: MapRunner = MapRunner;
static ROUTER: RouterRunner = RouterRunner;
static RETRY: RetryRunner = RetryRunner;

/// Runner for a node kind
pub fn runner_for(kind: &NodeKind) -> &'static dyn NodeRunner {
    match kind {
        NodeKind::Input => &INPUT,
        NodeKind::Output => &OUTPUT,
        NodeKind::Processor {
            runtime: Runtime::Llm(_),
        } => &LLM,
        NodeKind::Processor {
            runtime: Runtime::Function(_),
        }
        | NodeKind::Function(_) => &FUNCTION,
        NodeKind::Map { .. } => &MAP,
        NodeKind::Router { .. } => &ROUTER,
        NodeKind::Retry { .. } => &RETRY,
    }
}

/// Inputs for a node: edge-delivered values overlaid with resolved bindings
///
/// An edge reads `outputs[source][sourceOutputId]`; a source whose recorded
/// output is not an object delivers the whole value.
pub fn resolve_inputs(
    node: &Node,
    graph: &GraphDefinition,
    context: &ExecutionContext,
) -> Map<String, Value> {
    let mut inputs = Map::new();

    for edge in graph.incoming_edges(&node.id) {
        let Some(output) = context.output(&edge.source_node_id) else {
            continue;
        };
        let value = match output {
            Value::Object(ports) => ports.get(&edge.source_output_id).cloned(),
            other => Some(other.clone()),
        };
        if let Some(value) = value {
            inputs.insert(edge.target_input_id.clone(), value);
        }
    }

    for (port, binding) in &node.bindings {
        inputs.insert(port.clone(), template::resolve(binding, context));
    }

    inputs
}
