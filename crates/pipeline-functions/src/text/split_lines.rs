//! `core:splitLines`
//!
//! Parses numbered or bulleted text (typical LLM list output) into a list
//! of item strings.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pipeline_engine::{ExecutionContext, FunctionDescriptor, PipelineFunction, Result, Services};
use regex::Regex;
use serde_json::{Map, Value};

use crate::args;

/// Leading list markers: `1.`, `2)`, `-`, `*`, `•`
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+").expect("list marker pattern"));

/// Splits `text` into non-blank lines with list markers stripped
pub struct SplitLinesFunction;

impl SplitLinesFunction {
    pub const NAME: &'static str = "core:splitLines";

    pub fn create() -> Arc<dyn PipelineFunction> {
        Arc::new(Self)
    }

    fn split(text: &str) -> Vec<String> {
        text.lines()
            .map(|line| MARKER.replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

#[async_trait]
impl PipelineFunction for SplitLinesFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        let text = args::text(&inputs, "text")?;
        let items = Self::split(&text);
        log::debug!("splitLines: {} items", items.len());
        Ok(Value::Array(items.into_iter().map(Value::String).collect()))
    }
}

inventory::submit!(FunctionDescriptor {
    name: SplitLinesFunction::NAME,
    description: "Parse numbered or bulleted text into a list",
    create: SplitLinesFunction::create,
});
