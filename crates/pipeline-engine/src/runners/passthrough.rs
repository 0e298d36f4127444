use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::error::Result;
use crate::types::Node;

/// Input nodes are seeded from the run's initial inputs before wave 0
pub struct InputRunner;

#[async_trait]
impl NodeRunner for InputRunner {
    async fn run(
        &self,
        _node: &Node,
        _inputs: Map<String, Value>,
        _env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        Ok(NodeOutcome::seeded())
    }
}

/// Output nodes record their resolved inputs object
pub struct OutputRunner;

#[async_trait]
impl NodeRunner for OutputRunner {
    async fn run(
        &self,
        _node: &Node,
        inputs: Map<String, Value>,
        _env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        Ok(NodeOutcome::recorded(Value::Object(inputs)))
    }
}
