//! Per-run execution context.
//!
//! The context holds every completed node's output plus the run's shared
//! variables. Outputs are append-only: a node id is written exactly once,
//! after the node's wave has joined, so concurrent wave members only ever
//! read entries from earlier waves.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::types::NodeId;

/// Variable holding the current item inside a map scope
pub const ITEM_VARIABLE: &str = "item";
/// Variable holding the current item's position inside a map scope
pub const INDEX_VARIABLE: &str = "index";
/// Variable holding the 1-based attempt number inside a retry body
pub const ATTEMPT_VARIABLE: &str = "attempt";
/// Variable holding the attempt budget inside a retry body
pub const MAX_ATTEMPTS_VARIABLE: &str = "maxAttempts";

/// Outputs and variables for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    outputs: HashMap<NodeId, Value>,
    variables: Map<String, Value>,
}

impl ExecutionContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with initial variables.
    pub fn with_variables(variables: Map<String, Value>) -> Self {
        Self {
            outputs: HashMap::new(),
            variables,
        }
    }

    /// Record a node's output. Fails if the node already has one.
    pub fn record(&mut self, node_id: impl Into<NodeId>, value: Value) -> Result<()> {
        let node_id = node_id.into();
        if self.outputs.contains_key(&node_id) {
            return Err(EngineError::DuplicateOutput(node_id));
        }
        self.outputs.insert(node_id, value);
        Ok(())
    }

    /// Get a node's recorded output.
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    /// Check if a node has recorded output.
    pub fn has_output(&self, node_id: &str) -> bool {
        self.outputs.contains_key(node_id)
    }

    pub fn outputs(&self) -> &HashMap<NodeId, Value> {
        &self.outputs
    }

    /// Get a shared variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Set a shared variable. Only valid before the run starts or while
    /// building a child scope; running nodes see the context read-only.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Child scope for one map item: the outer variables plus `item` and
    /// `index`, and optionally a snapshot of the outer outputs.
    pub fn item_scope(&self, item: Value, index: usize, inherit_outputs: bool) -> Self {
        let mut scope = Self {
            outputs: if inherit_outputs {
                self.outputs.clone()
            } else {
                HashMap::new()
            },
            variables: self.variables.clone(),
        };
        scope.set_variable(ITEM_VARIABLE, item);
        scope.set_variable(INDEX_VARIABLE, Value::from(index));
        scope
    }

    /// Get all outputs, consuming the context.
    pub fn into_outputs(self) -> HashMap<NodeId, Value> {
        self.outputs
    }
}
