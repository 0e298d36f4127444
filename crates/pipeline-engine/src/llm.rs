//! LLM execution capability.
//!
//! The engine only needs "prompt in, text out". Vendor request mapping, key
//! rotation and provider-side retry live behind this trait in the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::LlmRuntime;

/// Settings forwarded to the capability with each prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    /// Rendered system prompt, if the node declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl RuntimeConfig {
    pub fn from_runtime(runtime: &LlmRuntime, system_prompt: Option<String>) -> Self {
        Self {
            provider: runtime.provider.clone(),
            model: runtime.model.clone(),
            temperature: runtime.temperature,
            system_prompt,
        }
    }
}

/// Something that can turn a prompt into text.
///
/// Implementations report transport, auth and quota failures as
/// [`EngineError::Provider`](crate::EngineError::Provider).
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn execute(&self, prompt: &str, config: &RuntimeConfig) -> Result<String>;
}

/// Capability that answers with the prompt itself.
///
/// Used for dry runs and tests; never reaches a vendor.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoLlm;

#[async_trait]
impl LlmCapability for EchoLlm {
    async fn execute(&self, prompt: &str, _config: &RuntimeConfig) -> Result<String> {
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_llm() {
        let config = RuntimeConfig {
            provider: "none".into(),
            model: "echo".into(),
            temperature: 0.0,
            system_prompt: None,
        };
        let reply = EchoLlm.execute("hello", &config).await.unwrap();
        assert_eq!(reply, "hello");
    }
}
