//! Registered function calls and the `core:runGraph` sub-pipeline call

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::error::{EngineError, Result};
use crate::registry::RUN_GRAPH_FUNCTION;
use crate::types::{FunctionRuntime, Node};

/// Option/input key naming the graph for `core:runGraph`
const GRAPH_ID_KEY: &str = "graphId";

pub struct FunctionRunner;

#[async_trait]
impl NodeRunner for FunctionRunner {
    async fn run(
        &self,
        node: &Node,
        inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        let runtime = node
            .kind
            .function_runtime()
            .ok_or_else(|| EngineError::failed(format!("'{}' has no function runtime", node.id)))?;

        if let Some(schema) = &runtime.input_schema {
            check_schema(schema, &Value::Object(inputs.clone()), format!("{} input", node.id))?;
        }

        let result = if runtime.function_name == RUN_GRAPH_FUNCTION {
            run_graph(runtime, inputs, env).await?
        } else {
            let function = env
                .executor
                .functions()
                .get(&runtime.function_name)
                .ok_or_else(|| EngineError::FunctionNotFound(runtime.function_name.clone()))?;

            let mut call_inputs = inputs;
            for (key, value) in &runtime.options {
                call_inputs.entry(key.clone()).or_insert_with(|| value.clone());
            }
            function
                .call(call_inputs, env.context, env.executor.services())
                .await?
        };

        if let Some(schema) = &runtime.output_schema {
            check_schema(schema, &result, format!("{} output", node.id))?;
        }

        let output = if result.is_object() {
            result
        } else {
            node.single_output(result)
        };
        Ok(NodeOutcome::recorded(output))
    }
}

/// Run a stored graph in a child executor with a fresh context, seeding every
/// input node with this node's inputs
async fn run_graph(
    runtime: &FunctionRuntime,
    mut inputs: Map<String, Value>,
    env: &RunnerEnv<'_>,
) -> Result<Value> {
    let graph_id = runtime
        .options
        .get(GRAPH_ID_KEY)
        .or_else(|| inputs.get(GRAPH_ID_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::MissingInput(GRAPH_ID_KEY.to_string()))?;
    inputs.remove(GRAPH_ID_KEY);

    let registry = env
        .executor
        .services()
        .graphs()
        .ok_or_else(|| EngineError::SubgraphNotFound(graph_id.clone()))?;
    let graph = registry
        .get(&graph_id)
        .await
        .ok_or_else(|| EngineError::SubgraphNotFound(graph_id.clone()))?;

    let child = env.executor.child()?;
    let seeds: Map<String, Value> = graph
        .input_nodes()
        .map(|n| (n.id.clone(), Value::Object(inputs.clone())))
        .collect();

    log::debug!("Running sub-pipeline '{}' at depth {}", graph_id, child.depth());
    let result = child
        .execute_with_cancel(&graph, seeds, env.cancel.child_token())
        .await?;
    Ok(result.designated_output())
}

/// Validate `instance` against a JSON Schema (draft 7)
fn check_schema(schema: &Value, instance: &Value, target: String) -> Result<()> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| EngineError::Validation {
        target: target.clone(),
        messages: vec![format!("invalid schema: {}", e)],
    })?;

    let messages: Vec<String> = validator
        .iter_errors(instance)
        .map(|error| format!("/{}: {}", error.instance_path, error))
        .collect();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation { target, messages })
    }
}
