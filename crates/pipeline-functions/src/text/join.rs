//! `core:join`
//!
//! Joins list items into one text block. With `key`, each object item
//! contributes that field instead of the whole item.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    template, ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services,
};
use serde_json::{Map, Value};

use crate::args;

/// Joins `items` with `separator` (default newline)
///
/// # Arguments
/// - `items` (required) - list, or text holding a JSON array
/// - `key` - field to take from each object item
/// - `separator` - defaults to `"\n"`
pub struct JoinFunction;

impl JoinFunction {
    pub const NAME: &'static str = "core:join";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    fn join(items: &[Value], key: Option<&str>, separator: &str) -> String {
        items
            .iter()
            .filter_map(|item| match key {
                Some(key) => item.get(key),
                None => Some(item),
            })
            .map(template::stringify)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[async_trait]
impl PipelineFunction for JoinFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let items = args::list(&inputs, "items")?;
        let key = inputs.get("key").and_then(Value::as_str);
        let separator = args::option_str(&inputs, "separator", "\n");
        log::debug!("join: {} items", items.len());
        Ok(Value::String(Self::join(&items, key, separator)))
    }
}

inventory::submit!(FunctionDescriptor {
    name: JoinFunction::NAME,
    description: "Join list items into text",
    create: JoinFunction::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_plain_items() {
        let items = vec![json!("a"), json!(2), json!("c")];
        assert_eq!(JoinFunction::join(&items, None, ", "), "a, 2, c");
    }

    #[test]
    fn test_join_by_key_skips_missing() {
        let items = vec![json!({"name": "Ash"}), json!({"other": 1}), json!({"name": "Bea"})];
        assert_eq!(JoinFunction::join(&items, Some("name"), "\n"), "Ash\nBea");
    }

    #[tokio::test]
    async fn test_call_defaults_to_newline() {
        let inputs = json!({"items": ["one", "two"]}).as_object().unwrap().clone();
        let result = JoinFunction
            .call(inputs, &ExecutionContext::new(), &Services::new())
            .await
            .unwrap();
        assert_eq!(result, json!("one\ntwo"));
    }

    #[tokio::test]
    async fn test_call_requires_items() {
        let result = JoinFunction
            .call(Map::new(), &ExecutionContext::new(), &Services::new())
            .await;
        assert!(result.is_err());
    }
}
