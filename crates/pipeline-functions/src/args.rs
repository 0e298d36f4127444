//! Argument helpers shared by the built-in functions

use pipeline_engine::{template, EngineError, Result};
use serde_json::{Map, Value};

/// A required argument
pub(crate) fn require<'a>(inputs: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    inputs
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| EngineError::MissingInput(key.to_string()))
}

/// A list argument; a string holding a JSON array is accepted too
pub(crate) fn list(inputs: &Map<String, Value>, key: &str) -> Result<Vec<Value>> {
    match require(inputs, key)? {
        Value::Array(items) => Ok(items.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(EngineError::NotAList(format!("argument '{}'", key))),
        },
        _ => Err(EngineError::NotAList(format!("argument '{}'", key))),
    }
}

/// A text argument; non-string values are stringified
pub(crate) fn text(inputs: &Map<String, Value>, key: &str) -> Result<String> {
    require(inputs, key).map(template::stringify)
}

/// An optional string option with a default
pub(crate) fn option_str<'a>(inputs: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    inputs.get(key).and_then(Value::as_str).unwrap_or(default)
}
