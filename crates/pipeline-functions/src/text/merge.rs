//! `core:merge`
//!
//! Combines text inputs into one block, dropping empty ones. Useful for
//! gathering the results of parallel branches.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    template, ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services,
};
use serde_json::{json, Map, Value};

use crate::args;

/// Merges `inputs` into `{merged, count}`
///
/// `inputs` may be a list or a single value. When absent, every other
/// argument except `separator` is merged in key order.
pub struct MergeFunction;

impl MergeFunction {
    pub const NAME: &'static str = "core:merge";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    fn collect(inputs: &Map<String, Value>) -> Vec<String> {
        let values: Vec<&Value> = match inputs.get("inputs") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
            None => {
                let mut keyed: Vec<(&String, &Value)> = inputs
                    .iter()
                    .filter(|(key, _)| key.as_str() != "separator")
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(b.0));
                keyed.into_iter().map(|(_, v)| v).collect()
            }
        };
        values
            .into_iter()
            .filter(|v| !v.is_null())
            .map(template::stringify)
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

#[async_trait]
impl PipelineFunction for MergeFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let separator = args::option_str(&inputs, "separator", "\n");
        let parts = Self::collect(&inputs);
        let merged = parts.join(separator);
        log::debug!("merge: {} inputs into {} chars", parts.len(), merged.len());
        Ok(json!({ "merged": merged, "count": parts.len() }))
    }
}

inventory::submit!(FunctionDescriptor {
    name: MergeFunction::NAME,
    description: "Merge non-empty text inputs",
    create: MergeFunction::create,
});
