//! `core:nonEmpty`
//!
//! Retry predicate accepting any attempt that produced text.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    ExecutionContext, FunctionDescriptor, PipelineFunction, Result, RetryDecision, Services,
};
use serde_json::{Map, Value};

/// Returns `ok` when `output` holds non-blank text, `retry` while
/// `attempt < maxAttempts`, and `fail` after that
pub struct NonEmptyPredicate;

impl NonEmptyPredicate {
    pub const NAME: &'static str = "core:nonEmpty";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    fn decide(output: &Value, attempt: u64, max_attempts: u64) -> RetryDecision {
        if !is_blank(output) {
            RetryDecision::Ok
        } else if attempt < max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::Fail
        }
    }
}

/// Null, whitespace, or containers holding nothing else
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        Value::Object(map) => map.values().all(is_blank),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[async_trait]
impl PipelineFunction for NonEmptyPredicate {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let output = inputs.get("output").unwrap_or(&Value::Null);
        let attempt = inputs.get("attempt").and_then(Value::as_u64).unwrap_or(1);
        let max_attempts = inputs
            .get("maxAttempts")
            .and_then(Value::as_u64)
            .unwrap_or(attempt);

        let status = match Self::decide(output, attempt, max_attempts) {
            RetryDecision::Ok => "ok",
            RetryDecision::Retry => "retry",
            RetryDecision::Fail => "fail",
        };
        log::debug!("nonEmpty: attempt {}/{} -> {}", attempt, max_attempts, status);
        Ok(Value::String(status.to_string()))
    }
}

inventory::submit!(FunctionDescriptor {
    name: NonEmptyPredicate::NAME,
    description: "Retry predicate: accept non-empty output",
    create: NonEmptyPredicate::create,
});
