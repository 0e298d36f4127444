//! `{{path}}` placeholder resolution.
//!
//! A template that is exactly one placeholder resolves to the raw value at
//! that path, so numbers, lists and objects keep their type. Anything else is
//! rendered as text with each resolvable placeholder substituted; placeholders
//! that do not resolve are left in place verbatim.
//!
//! # Path grammar
//!
//! - `variables.<name>[.<key>...]` reads a shared variable
//! - `outputs.<nodeId>[.<key>...]` reads a node's recorded output
//! - `<nodeId>[.<key>...]` is the same without the `outputs` prefix
//! - `<name>[.<key>...]` falls back to a top-level variable (`item`, `index`)
//!
//! Keys index objects by name and arrays by position.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::types::NodeId;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern"));

static WHOLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").expect("placeholder pattern"));

static OUTPUT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"outputs\.([\w-]+)").expect("reference pattern"));

/// Resolve a template against the context, preserving the value's type when
/// the template is a single placeholder.
pub fn resolve(template: &str, context: &ExecutionContext) -> Value {
    if let Some(caps) = WHOLE_PLACEHOLDER.captures(template) {
        if let Some(value) = lookup(&caps[1], context) {
            return value.clone();
        }
    }
    Value::String(render(template, context))
}

/// Render a template as text.
pub fn render(template: &str, context: &ExecutionContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match lookup(&caps[1], context) {
            Some(value) => stringify(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Node ids referenced as `outputs.<nodeId>` anywhere in the template,
/// in order of first appearance.
pub fn references(template: &str) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = Vec::new();
    for caps in OUTPUT_REFERENCE.captures_iter(template) {
        let id = &caps[1];
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

/// Look up a dotted path in the context.
pub fn lookup<'a>(path: &str, context: &'a ExecutionContext) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim);
    let head = segments.next()?;

    let root = match head {
        "variables" => {
            let name = segments.next()?;
            context.variable(name)?
        }
        "outputs" => {
            let node_id = segments.next()?;
            context.output(node_id)?
        }
        other => context.output(other).or_else(|| context.variable(other))?,
    };

    segments.try_fold(root, descend)
}

fn descend<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
