//! Fan-out/fan-in over a list
//!
//! Each item runs the template node as a one-node sub-pipeline in its own
//! scope. Items run concurrently up to `mapConcurrency`, and results come
//! back in list order regardless of completion order.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeRunner, RunnerEnv};
use crate::config::MapScope;
use crate::error::{EngineError, Result};
use crate::template;
use crate::types::{GraphDefinition, Node, NodeKind};

/// Output key used when the map node declares no output port
const RESULTS_PORT: &str = "results";

pub struct MapRunner;

#[async_trait]
impl NodeRunner for MapRunner {
    async fn run(
        &self,
        node: &Node,
        _inputs: Map<String, Value>,
        env: &RunnerEnv<'_>,
    ) -> Result<NodeOutcome> {
        let NodeKind::Map {
            input_list_ref,
            template_node,
        } = &node.kind
        else {
            return Err(EngineError::failed(format!("'{}' is not a map", node.id)));
        };

        let items = as_list(template::resolve(input_list_ref, env.context))?;
        let config = env.executor.config();
        let inherit = config.map_scope == MapScope::InheritOutputs;
        let concurrency = config.map_concurrency.max(1);
        let child = env.executor.child()?;
        log::debug!(
            "Map '{}' over {} items (concurrency {})",
            node.id,
            items.len(),
            concurrency
        );

        let child = &child;
        let template: &Node = template_node;
        let results: Vec<Value> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let scope = env.context.item_scope(item, index, inherit);
                let item_graph = GraphDefinition {
                    id: format!("{}[{}]", node.id, index),
                    name: template.name.clone(),
                    nodes: vec![template.clone()],
                    ..GraphDefinition::default()
                };
                async move {
                    let result = child
                        .execute_scoped(&item_graph, scope, Map::new(), env.cancel.child_token())
                        .await
                        .map_err(|e| EngineError::at_node(item_graph.id.clone(), e))?;
                    Ok::<_, EngineError>(item_value(template, result.context.output(&template.id)))
                }
            })
            .buffered(concurrency)
            .try_collect::<Vec<Value>>()
            .await?;

        let port = node
            .outputs
            .first()
            .map(|p| p.id.clone())
            .unwrap_or_else(|| RESULTS_PORT.to_string());
        let mut output = Map::new();
        output.insert(port, Value::Array(results));
        Ok(NodeOutcome::recorded(Value::Object(output)))
    }
}

/// A list, or a string holding a JSON array
fn as_list(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(EngineError::NotAList(preview(&text))),
        },
        other => Err(EngineError::NotAList(preview(&other.to_string()))),
    }
}

/// The item's value under the template's primary port, or the whole output
/// when that port is absent
fn item_value(template: &Node, recorded: Option<&Value>) -> Value {
    match recorded {
        Some(Value::Object(ports)) => ports
            .get(template.primary_output())
            .cloned()
            .unwrap_or_else(|| Value::Object(ports.clone())),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_list() {
        assert_eq!(as_list(json!(["a", "b"])).unwrap().len(), 2);
        assert_eq!(as_list(json!(" [1, 2, 3] ")).unwrap(), vec![json!(1), json!(2), json!(3)]);
        assert!(matches!(as_list(json!("not a list")), Err(EngineError::NotAList(_))));
        assert!(matches!(as_list(json!({"a": 1})), Err(EngineError::NotAList(_))));
    }

    #[test]
    fn test_item_value_unwraps_primary_port() {
        let template = Node::new("t", NodeKind::Output);
        assert_eq!(item_value(&template, Some(&json!({"output": "A"}))), json!("A"));
        assert_eq!(
            item_value(&template, Some(&json!({"other": 1}))),
            json!({"other": 1})
        );
        assert_eq!(item_value(&template, None), Value::Null);
    }
}
