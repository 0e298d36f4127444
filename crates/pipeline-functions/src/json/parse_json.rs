//! `core:parseJson`
//!
//! Parses JSON embedded in model output. Code fences and surrounding prose
//! are tolerated.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    EngineError, ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services,
};
use serde_json::{Map, Value};

use crate::args;

pub struct ParseJsonFunction;

impl ParseJsonFunction {
    pub const NAME: &'static str = "core:parseJson";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    pub fn parse(text: &str) -> Result<Value> {
        let body = strip_fences(text.trim());
        if let Ok(value) = serde_json::from_str(body) {
            return Ok(value);
        }

        // First object or array in the text
        let start = body
            .find(['{', '['])
            .ok_or_else(|| EngineError::failed("no JSON value found in text"))?;
        let close = if body[start..].starts_with('{') { '}' } else { ']' };
        let end = body
            .rfind(close)
            .filter(|end| *end > start)
            .ok_or_else(|| EngineError::failed("unterminated JSON value in text"))?;
        Ok(serde_json::from_str(&body[start..=end])?)
    }
}

/// Body of a ```` ```json ```` fenced block, or the text unchanged
fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the language tag line
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

#[async_trait]
impl PipelineFunction for ParseJsonFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        match args::require(&inputs, "text")? {
            Value::String(text) => Self::parse(text),
            // Already structured
            other => Ok(other.clone()),
        }
    }
}

inventory::submit!(FunctionDescriptor {
    name: ParseJsonFunction::NAME,
    description: "Parse JSON from model output, tolerating code fences",
    create: ParseJsonFunction::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain() {
        assert_eq!(ParseJsonFunction::parse(" [1, 2] ").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_parse_fenced() {
        let text = "Here you go:\n```json\n{\"name\": \"Ash\"}\n```\nEnjoy!";
        assert_eq!(ParseJsonFunction::parse(text).unwrap(), json!({"name": "Ash"}));
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        let text = "The characters are [\"Ash\", \"Bea\"] as requested.";
        assert_eq!(ParseJsonFunction::parse(text).unwrap(), json!(["Ash", "Bea"]));
    }

    #[test]
    fn test_parse_failures() {
        assert!(ParseJsonFunction::parse("no json here").is_err());
        assert!(matches!(
            ParseJsonFunction::parse("broken {\"a\": }"),
            Err(EngineError::Serialization(_))
        ));
    }
}
