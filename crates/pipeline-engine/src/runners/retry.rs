//! Retry nodes: run a body sub-pipeline until a predicate function accepts

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::context::{ExecutionContext, ATTEMPT_VARIABLE, MAX_ATTEMPTS_VARIABLE};
use crate::error::{EngineError, Result};
use crate::events::PipelineEvent;
use crate::retry::{RetryDecision, RetryLoop};
use crate::types::{GraphDefinition, Node, NodeKind};

pub struct RetryRunner;

#[async_trait]
impl NodeRunner for RetryRunner {
    async fn run(
        &self,
        node: &Node,
        inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        let NodeKind::Retry {
            body,
            body_graph_id,
            predicate,
            max_attempts,
        } = &node.kind
        else {
            return Err(EngineError::failed(format!("'{}' is not a retry node", node.id)));
        };

        let body_graph = match (body, body_graph_id) {
            (Some(body), _) => body.as_ref().clone(),
            (None, Some(graph_id)) => {
                let registry = env
                    .executor
                    .services()
                    .graphs()
                    .ok_or_else(|| EngineError::SubgraphNotFound(graph_id.clone()))?;
                registry
                    .get(graph_id)
                    .await
                    .ok_or_else(|| EngineError::SubgraphNotFound(graph_id.clone()))?
            }
            (None, None) => {
                return Err(EngineError::failed(format!("retry '{}' has no body", node.id)))
            }
        };

        let predicate_fn = env
            .executor
            .functions()
            .get(predicate)
            .ok_or_else(|| EngineError::FunctionNotFound(predicate.clone()))?;

        let retry = RetryLoop::capped(*max_attempts, env.executor.config().max_retry_attempts);
        let limit = retry.max_attempts();
        let child = env.executor.child()?;

        let child = &child;
        let body_graph = &body_graph;
        let inputs = &inputs;
        let predicate_fn = &predicate_fn;
        let outcome = retry
            .run(
                move |attempt| async move {
                    env.executor.emit(PipelineEvent::RetryAttempt {
                        execution_id: env.execution_id.to_string(),
                        node_id: node.id.clone(),
                        attempt,
                        max_attempts: limit,
                    });
                    let result = child
                        .execute_scoped(
                            body_graph,
                            attempt_scope(body_graph, attempt, limit),
                            seed_inputs(body_graph, inputs),
                            env.cancel.child_token(),
                        )
                        .await?;
                    Ok(result.designated_output())
                },
                move |output, attempt| async move {
                    let mut args = Map::new();
                    args.insert("output".to_string(), output);
                    args.insert(ATTEMPT_VARIABLE.to_string(), Value::from(attempt));
                    args.insert(MAX_ATTEMPTS_VARIABLE.to_string(), Value::from(limit));
                    let verdict = predicate_fn
                        .call(args, env.context, env.executor.services())
                        .await?;
                    RetryDecision::from_value(&verdict)
                },
            )
            .await?;

        log::debug!("Retry '{}' accepted on attempt {}", node.id, outcome.attempts);
        let mut output = Map::new();
        output.insert(node.primary_output().to_string(), outcome.value);
        output.insert("attempts".to_string(), Value::from(outcome.attempts));
        Ok(NodeOutcome::recorded(Value::Object(output)))
    }
}

/// Fresh context for one attempt: the body's variables plus the attempt
/// counters
fn attempt_scope(body: &GraphDefinition, attempt: u32, limit: u32) -> ExecutionContext {
    let mut context = ExecutionContext::with_variables(body.variables.clone());
    context.set_variable(ATTEMPT_VARIABLE, Value::from(attempt));
    context.set_variable(MAX_ATTEMPTS_VARIABLE, Value::from(limit));
    context
}

fn seed_inputs(body: &GraphDefinition, inputs: &Map<String, Value>) -> Map<String, Value> {
    body.input_nodes()
        .map(|n| (n.id.clone(), Value::Object(inputs.clone())))
        .collect()
}
