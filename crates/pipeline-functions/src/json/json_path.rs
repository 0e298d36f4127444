//! `core:jsonPath`
//!
//! Extracts a value from JSON data using a path expression.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services};
use serde_json::{json, Map, Value};

use crate::args;

/// Path extraction with dot and bracket notation
///
/// # Path Syntax Examples
/// - `"name"` - the "name" field
/// - `"data.items"` - nested field
/// - `"[0]"` - first array element
/// - `"items[0].name"` - combined access
///
/// # Arguments
/// - `json` (required) - value to search; text holding JSON is parsed first
/// - `path` - path expression, empty for the whole value
/// - `default` - returned when the path is missing
///
/// Returns `{value, found}`.
pub struct JsonPathFunction;

impl JsonPathFunction {
    pub const NAME: &'static str = "core:jsonPath";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    pub fn extract(json: &Value, path: &str) -> Option<Value> {
        let mut current = json;
        let mut remaining = path.trim();

        while !remaining.is_empty() {
            if let Some(rest) = remaining.strip_prefix('[') {
                let end = rest.find(']')?;
                let index = rest[..end].trim().parse::<usize>().ok()?;
                current = current.get(index)?;
                remaining = &rest[end + 1..];
                remaining = remaining.strip_prefix('.').unwrap_or(remaining);
                continue;
            }

            let split = remaining.find(['.', '[']).unwrap_or(remaining.len());
            let field = &remaining[..split];
            if !field.is_empty() {
                current = current.get(field)?;
            }
            remaining = &remaining[split..];
            remaining = remaining.strip_prefix('.').unwrap_or(remaining);
        }

        Some(current.clone())
    }
}

#[async_trait]
impl PipelineFunction for JsonPathFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let source = match args::require(&inputs, "json")? {
            Value::String(text) => serde_json::from_str(text)?,
            other => other.clone(),
        };
        let path = args::option_str(&inputs, "path", "");

        let (value, found) = match Self::extract(&source, path) {
            Some(value) => (value, true),
            None => (inputs.get("default").cloned().unwrap_or(Value::Null), false),
        };
        log::debug!("jsonPath '{}': found={}", path, found);
        Ok(json!({ "value": value, "found": found }))
    }
}

inventory::submit!(FunctionDescriptor {
    name: JsonPathFunction::NAME,
    description: "Extract a value by dot/bracket path",
    create: JsonPathFunction::create,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fields_and_indexes() {
        let data = json!({"data": {"items": [10, 20, 30], "name": "nested"}});
        assert_eq!(JsonPathFunction::extract(&data, "data.name"), Some(json!("nested")));
        assert_eq!(JsonPathFunction::extract(&data, "data.items[2]"), Some(json!(30)));
        assert_eq!(JsonPathFunction::extract(&data, ""), Some(data.clone()));
    }

    #[test]
    fn test_extract_array_then_field() {
        let data = json!([{"name": "first"}, {"name": "second"}]);
        assert_eq!(JsonPathFunction::extract(&data, "[1].name"), Some(json!("second")));
        assert_eq!(JsonPathFunction::extract(&data, "[5]"), None);
        assert_eq!(JsonPathFunction::extract(&data, "[x]"), None);
    }

    #[test]
    fn test_extract_deep_path() {
        let data = json!({
            "response": {"choices": [{"message": {"calls": [{"arguments": {"content": "hello"}}]}}]}
        });
        assert_eq!(
            JsonPathFunction::extract(&data, "response.choices[0].message.calls[0].arguments.content"),
            Some(json!("hello"))
        );
    }

    #[tokio::test]
    async fn test_call_parses_text_and_uses_default() {
        let inputs = json!({"json": "{\"a\": {\"b\": 1}}", "path": "a.c", "default": "none"});
        let result = JsonPathFunction
            .call(
                inputs.as_object().unwrap().clone(),
                &ExecutionContext::new(),
                &Services::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"value": "none", "found": false}));
    }
}
