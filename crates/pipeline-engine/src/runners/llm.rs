use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::error::{EngineError, Result};
use crate::llm::RuntimeConfig;
use crate::template;
use crate::types::{Node, NodeKind, Runtime};

/// Renders the prompts and hands them to the LLM capability. No retries;
/// use a retry node for that.
pub struct LlmRunner;

#[async_trait]
impl NodeRunner for LlmRunner {
    async fn run(
        &self,
        node: &Node,
        _inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        let NodeKind::Processor {
            runtime: Runtime::Llm(llm),
        } = &node.kind
        else {
            return Err(EngineError::failed(format!("'{}' is not an LLM node", node.id)));
        };

        let prompt = template::render(&llm.user_prompt, env.context);
        let system_prompt = llm
            .system_prompt
            .as_deref()
            .map(|s| template::render(s, env.context));
        let config = RuntimeConfig::from_runtime(llm, system_prompt);
        let capability = env.executor.services().llm()?;

        if env.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let timeout_ms = env.executor.config().llm_timeout_ms;
        log::debug!(
            "LLM call for '{}' ({}/{}, {} chars)",
            node.id,
            config.provider,
            config.model,
            prompt.len()
        );
        let text = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            capability.execute(&prompt, &config),
        )
        .await
        {
            Ok(reply) => reply?,
            Err(_) => return Err(EngineError::Timeout(timeout_ms)),
        };

        if env.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        Ok(NodeOutcome::recorded(node.single_output(Value::String(text))))
    }
}
