//! `core:pluck`

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services};
use serde_json::{Map, Value};

use crate::args;

/// Takes `key` from every item of `items`. Items without the key yield
/// null so positions stay aligned with the source list.
pub struct PluckFunction;

impl PluckFunction {
    pub const NAME: &'static str = "core:pluck";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }
}

#[async_trait]
impl PipelineFunction for PluckFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let items = args::list(&inputs, "items")?;
        let key = args::text(&inputs, "key")?;
        Ok(Value::Array(
            items
                .iter()
                .map(|item| item.get(&key).cloned().unwrap_or(Value::Null))
                .collect(),
        ))
    }
}

inventory::submit!(FunctionDescriptor {
    name: PluckFunction::NAME,
    description: "Extract one key from every list item",
    create: PluckFunction::create,
});
