//! Graph executor
//!
//! Validates a graph, derives its DAG, checks for cycles with a dry run, then
//! drives the wave scheduler. Every node of a wave runs concurrently on the
//! calling task; the context is only borrowed immutably while a wave is in
//! flight and outputs are recorded after the wave joins.
//!
//! Sub-pipelines (map items, `core:runGraph`, retry bodies) run through a
//! child executor with its own context, one level deeper.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::dependency::DependencyGraph;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, NullEventSink, PipelineEvent};
use crate::registry::{FunctionRegistry, PipelineFunction};
use crate::runners::{self, BranchSkips, NodeOutcome, RunnerEnv};
use crate::scheduler::WaveScheduler;
use crate::services::Services;
use crate::types::{GraphDefinition, Node, NodeId};
use crate::validation::validate_graph;

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    /// Output-node id -> recorded value
    pub outputs: BTreeMap<NodeId, Value>,
    /// Output of the graph's `finalNode`, when it has one and it ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// Nodes skipped by router decisions
    pub skipped: Vec<NodeId>,
    /// Waves as executed
    pub waves: Vec<Vec<NodeId>>,
    pub context: ExecutionContext,
}

impl ExecutionResult {
    /// The run's single designated value: the final node's output, else the
    /// only output node's value, else a map of output-node id to value
    pub fn designated_output(&self) -> Value {
        if let Some(final_output) = &self.final_output {
            return final_output.clone();
        }
        if self.outputs.len() == 1 {
            if let Some(only) = self.outputs.values().next() {
                return only.clone();
            }
        }
        Value::Object(
            self.outputs
                .iter()
                .map(|(id, value)| (id.clone(), value.clone()))
                .collect(),
        )
    }
}

/// Executes pipeline graphs
///
/// # Example
///
/// ```ignore
/// let executor = GraphExecutor::new(FunctionRegistry::with_builtins(), services)
///     .with_event_sink(Arc::new(LogEventSink));
/// let result = executor.execute(&graph, inputs).await?;
/// ```
#[derive(Clone)]
pub struct GraphExecutor {
    functions: Arc<FunctionRegistry>,
    services: Services,
    config: EngineConfig,
    event_sink: Arc<dyn EventSink>,
    /// Sub-pipeline nesting level, 0 for a top-level executor
    depth: usize,
}

impl GraphExecutor {
    /// Create an executor with default configuration and no event sink
    pub fn new(functions: FunctionRegistry, services: Services) -> Self {
        Self {
            functions: Arc::new(functions),
            services,
            config: EngineConfig::default(),
            event_sink: Arc::new(NullEventSink),
            depth: 0,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Register a function before executing
    pub fn register_function(&mut self, name: impl Into<String>, function: Arc<dyn PipelineFunction>) {
        Arc::make_mut(&mut self.functions).register(name, function);
    }

    /// Mutable access to the function registry (copy-on-write when shared)
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        Arc::make_mut(&mut self.functions)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Executor for a sub-pipeline, one level deeper
    pub fn child(&self) -> Result<GraphExecutor> {
        if self.depth >= self.config.max_subgraph_depth {
            return Err(EngineError::DepthExceeded(self.config.max_subgraph_depth));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self.clone()
        })
    }

    /// Structural validation; every issue is reported at once
    pub fn validate(&self, graph: &GraphDefinition) -> Result<()> {
        let issues = validate_graph(graph, &self.functions);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidGraph { issues })
        }
    }

    /// Validate and compute the wave plan without running anything
    pub fn plan(&self, graph: &GraphDefinition) -> Result<Vec<Vec<NodeId>>> {
        self.validate(graph)?;
        WaveScheduler::plan(&DependencyGraph::build(graph, self.config.map_scope))
    }

    /// Execute a graph with the given initial inputs (input-node id -> value)
    pub async fn execute(
        &self,
        graph: &GraphDefinition,
        initial_inputs: Map<String, Value>,
    ) -> Result<ExecutionResult> {
        self.execute_with_cancel(graph, initial_inputs, CancellationToken::new())
            .await
    }

    /// Execute a graph, stopping cooperatively when `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        graph: &GraphDefinition,
        initial_inputs: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        let context = ExecutionContext::with_variables(graph.variables.clone());
        self.execute_scoped(graph, context, initial_inputs, cancel)
            .await
    }

    /// Execute a graph in a caller-prepared context
    ///
    /// Boxed so runners can recurse into sub-pipelines.
    pub fn execute_scoped<'a>(
        &'a self,
        graph: &'a GraphDefinition,
        mut context: ExecutionContext,
        initial_inputs: Map<String, Value>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        async move {
            let execution_id = format!("exec-{}", uuid::Uuid::new_v4());

            self.validate(graph)?;
            let deps = DependencyGraph::build(graph, self.config.map_scope);
            // Dry run first so a cyclic graph executes nothing
            WaveScheduler::plan(&deps)?;

            log::debug!(
                "Starting run {} of '{}' ({} nodes, {:?} dependencies, depth {})",
                execution_id,
                graph.id,
                graph.nodes.len(),
                deps.source(),
                self.depth
            );
            self.emit(PipelineEvent::RunStarted {
                graph_id: graph.id.clone(),
                execution_id: execution_id.clone(),
                node_count: graph.nodes.len(),
            });

            let run = async {
                seed_inputs(graph, &initial_inputs, &mut context)?;
                self.run_waves(graph, &deps, &mut context, &execution_id, &cancel)
                    .await
            };

            match run.await {
                Ok((waves, skipped)) => {
                    self.emit(PipelineEvent::RunCompleted {
                        graph_id: graph.id.clone(),
                        execution_id: execution_id.clone(),
                        waves: waves.len(),
                    });

                    let outputs = graph
                        .output_nodes()
                        .filter_map(|n| context.output(&n.id).map(|v| (n.id.clone(), v.clone())))
                        .collect();
                    let final_output = graph
                        .final_node
                        .as_deref()
                        .and_then(|id| context.output(id).cloned());

                    Ok(ExecutionResult {
                        execution_id,
                        outputs,
                        final_output,
                        skipped,
                        waves,
                        context,
                    })
                }
                Err(e) => {
                    self.emit(PipelineEvent::RunFailed {
                        graph_id: graph.id.clone(),
                        execution_id,
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        }
        .boxed()
    }

    /// Drive the scheduler to completion. Returns the executed waves and the
    /// skipped node ids.
    async fn run_waves(
        &self,
        graph: &GraphDefinition,
        deps: &DependencyGraph,
        context: &mut ExecutionContext,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Vec<NodeId>>, Vec<NodeId>)> {
        let index = graph.node_index();
        let mut scheduler = WaveScheduler::new(deps);
        let mut skips = BranchSkips::new();
        let mut waves = Vec::new();

        while let Some(wave) = scheduler.next_wave() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let wave_number = waves.len();
            log::debug!("Wave {}: {:?}", wave_number, wave);
            self.emit(PipelineEvent::WaveStarted {
                execution_id: execution_id.to_string(),
                wave: wave_number,
                node_ids: wave.clone(),
            });

            let mut runnable: Vec<&Node> = Vec::with_capacity(wave.len());
            for id in &wave {
                if skips.should_skip(id, deps) {
                    skips.mark_skipped(id);
                    self.emit(PipelineEvent::NodeSkipped {
                        execution_id: execution_id.to_string(),
                        node_id: id.clone(),
                    });
                } else if let Some(node) = index.get(id.as_str()) {
                    runnable.push(*node);
                }
            }

            // Fail-fast for wave-mates only. The run token is left to the
            // runners' own checkpoints so in-flight work finishes.
            let abort = CancellationToken::new();
            let results: Vec<(&Node, Result<NodeOutcome>)> = {
                let env = RunnerEnv {
                    executor: self,
                    graph,
                    context: &*context,
                    cancel,
                    execution_id,
                };
                let env = &env;
                let abort = &abort;

                let mut pending: FuturesUnordered<_> = runnable
                    .iter()
                    .copied()
                    .map(|node| async move { (node, self.run_node(node, env, abort).await) })
                    .collect();

                let mut results = Vec::with_capacity(runnable.len());
                while let Some((node, result)) = pending.next().await {
                    if result.is_err() && !abort.is_cancelled() {
                        log::debug!("Node '{}' failed; aborting wave {}", node.id, wave_number);
                        abort.cancel();
                    }
                    results.push((node, result));
                }
                results
            };

            let mut failure = None;
            for (node, result) in results {
                match result {
                    Ok(outcome) => {
                        if let Some(output) = outcome.output {
                            context.record(node.id.clone(), output)?;
                        }
                        if let Some(decision) = outcome.route {
                            skips.apply(decision);
                        }
                    }
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(EngineError::at_node(node.id.clone(), e));
                        }
                    }
                }
            }
            if let Some(err) = failure {
                return Err(err);
            }

            self.emit(PipelineEvent::WaveCompleted {
                execution_id: execution_id.to_string(),
                wave: wave_number,
            });
            scheduler.complete(&wave);
            waves.push(wave);
        }

        Ok((waves, skips.into_skipped()))
    }

    /// Run one node: cancellation check, input resolution, runner dispatch,
    /// node timeout and lifecycle events
    ///
    /// Once started, a node is only interrupted by `abort` (a failed
    /// wave-mate). Run-wide cancellation is observed before the node starts
    /// and at the runners' checkpoints.
    async fn run_node(
        &self,
        node: &Node,
        env: &RunnerEnv<'_>,
        abort: &CancellationToken,
    ) -> Result<NodeOutcome> {
        if env.cancel.is_cancelled() || abort.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.emit(PipelineEvent::NodeStarted {
            execution_id: env.execution_id.to_string(),
            node_id: node.id.clone(),
            node_type: node.kind.type_name().to_string(),
        });

        let inputs = runners::resolve_inputs(node, env.graph, env.context);
        let runner = runners::runner_for(&node.kind);
        let work = async move {
            match node.timeout_ms {
                Some(ms) => {
                    match tokio::time::timeout(Duration::from_millis(ms), runner.run(node, inputs, env))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::Timeout(ms)),
                    }
                }
                None => runner.run(node, inputs, env).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = abort.cancelled() => Err(EngineError::Cancelled),
            result = work => result,
        };

        match &result {
            Ok(outcome) => {
                let output = match &outcome.output {
                    Some(output) => output.clone(),
                    None => env.context.output(&node.id).cloned().unwrap_or(Value::Null),
                };
                self.emit(PipelineEvent::NodeCompleted {
                    execution_id: env.execution_id.to_string(),
                    node_id: node.id.clone(),
                    output,
                });
            }
            Err(e) => {
                log::debug!("Node '{}' failed: {}", node.id, e);
                self.emit(PipelineEvent::NodeFailed {
                    execution_id: env.execution_id.to_string(),
                    node_id: node.id.clone(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::trace!("Dropped pipeline event: {}", e);
        }
    }
}

/// Record every input node's initial value
///
/// An object keyed by the node's output ports is recorded as given, so
/// `{"output": "..."}` stays one level deep. Any other value is wrapped under
/// the primary output port.
fn seed_inputs(
    graph: &GraphDefinition,
    initial_inputs: &Map<String, Value>,
    context: &mut ExecutionContext,
) -> Result<()> {
    for node in graph.input_nodes() {
        let value = match initial_inputs.get(&node.id) {
            Some(value) => value.clone(),
            None => {
                log::warn!("No initial input for input node '{}'; using null", node.id);
                Value::Null
            }
        };
        let output = if node.is_port_map(&value) {
            value
        } else {
            node.single_output(value)
        };
        context.record(node.id.clone(), output)?;
    }

    for key in initial_inputs.keys() {
        if !graph.input_nodes().any(|n| &n.id == key) {
            log::debug!("Initial input '{}' matches no input node", key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::error::ErrorKind;
    use crate::events::VecEventSink;
    use crate::graph_registry::InMemoryGraphRegistry;
    use crate::llm::EchoLlm;
    use crate::registry::RUN_GRAPH_FUNCTION;
    use crate::types::{FunctionRuntime, NodeKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn functions() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry.register_sync("shout", |inputs, _ctx| {
            let text = inputs.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(json!(text.to_uppercase()))
        });
        registry.register_sync("fail", |_, _| Err(EngineError::failed("boom")));
        registry.register_callback("slow", |inputs| async move {
            let text = inputs
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let delay = match text.as_str() {
                "A" => 60,
                "B" => 30,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!(format!("{}!", text)))
        });
        registry.register_callback("sleepy", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        });
        registry
    }

    fn executor() -> GraphExecutor {
        GraphExecutor::new(functions(), Services::new().with_llm(Arc::new(EchoLlm)))
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn function(name: &str) -> FunctionRuntime {
        FunctionRuntime::named(name)
    }

    #[tokio::test]
    async fn test_end_to_end_echo() {
        let graph = GraphBuilder::new("story")
            .input("input")
            .llm("writer", "{{outputs.input.output}}")
            .output("output")
            .edge("input", "output", "writer", "prompt")
            .edge("writer", "output", "output", "input")
            .build();

        let result = executor()
            .execute(&graph, inputs(json!({"input": {"output": "a knight and a dragon"}})))
            .await
            .unwrap();

        assert_eq!(
            json!(result.outputs),
            json!({"output": {"input": "a knight and a dragon"}})
        );
        assert_eq!(result.waves, vec![vec!["input"], vec!["writer"], vec!["output"]]);
        assert!(result.execution_id.starts_with("exec-"));
    }

    #[tokio::test]
    async fn test_template_mode_with_bindings_and_final_node() {
        let graph = GraphBuilder::new("g")
            .input("topic")
            .variable("suffix", json!("!"))
            .function("loud", function("shout"))
            .with_binding("text", "{{outputs.topic.output}}{{variables.suffix}}")
            .output("result")
            .with_binding("text", "{{outputs.loud.output}}")
            .final_node("loud")
            .build();

        let result = executor()
            .execute(&graph, inputs(json!({"topic": "dragons"})))
            .await
            .unwrap();

        assert_eq!(result.outputs["result"], json!({"text": "DRAGONS!"}));
        assert_eq!(result.final_output, Some(json!({"output": "DRAGONS!"})));
        assert_eq!(result.waves.len(), 3);
    }

    #[tokio::test]
    async fn test_cycle_executes_nothing() {
        let sink = Arc::new(VecEventSink::new());
        let graph = GraphBuilder::new("loop")
            .llm("x", "{{outputs.y.output}}")
            .llm("y", "{{outputs.x.output}}")
            .build();

        let err = executor()
            .with_event_sink(sink.clone())
            .execute(&graph, Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert_eq!(err.node_ids(), vec!["x", "y"]);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_graph_lists_every_issue() {
        let graph = GraphBuilder::new("bad")
            .function("a", function("missing"))
            .function("a", function("shout"))
            .build();

        let err = executor().execute(&graph, Map::new()).await.unwrap_err();
        match err {
            EngineError::InvalidGraph { issues } => assert_eq!(issues.len(), 2),
            other => panic!("expected invalid graph, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_map_keeps_list_order() {
        let template = Node::new("item-shout", NodeKind::Function(function("slow")));
        let mut template = template;
        template.bindings.insert("text".into(), "{{item}}".into());

        let graph = GraphBuilder::new("fan")
            .input("list")
            .map("each", "{{outputs.list.output}}", template)
            .build();

        let config = EngineConfig {
            map_concurrency: 3,
            ..EngineConfig::default()
        };
        let result = executor()
            .with_config(config)
            .execute(&graph, inputs(json!({"list": ["A", "B", "C"]})))
            .await
            .unwrap();

        assert_eq!(
            result.context.output("each"),
            Some(&json!({"results": ["A!", "B!", "C!"]}))
        );
    }

    #[tokio::test]
    async fn test_map_item_failure_names_the_item() {
        let template = Node::new("item-fail", NodeKind::Function(function("fail")));
        let graph = GraphBuilder::new("fan")
            .input("list")
            .map("each", "{{outputs.list.output}}", template)
            .build();

        let err = executor()
            .execute(&graph, inputs(json!({"list": "[1, 2]"})))
            .await
            .unwrap_err();

        assert_eq!(err.node_ids(), vec!["each", "each[0]", "item-fail"]);
    }

    #[tokio::test]
    async fn test_router_runs_only_selected_branch() {
        let sink = Arc::new(VecEventSink::new());
        let graph = GraphBuilder::new("branching")
            .input("judge")
            .router(
                "branch",
                "{{outputs.judge.output}}",
                [("Yes", "combat"), ("No", "peaceful")],
                None,
            )
            .llm("combat", "fight")
            .llm("peaceful", "talk")
            .llm("aftermath", "{{outputs.peaceful.output}}")
            .build();

        let result = executor()
            .with_event_sink(sink.clone())
            .execute(&graph, inputs(json!({"judge": " Yes "})))
            .await
            .unwrap();

        assert_eq!(result.context.output("branch"), Some(&json!({"output": "Yes"})));
        assert_eq!(result.context.output("combat"), Some(&json!({"output": "fight"})));
        assert!(!result.context.has_output("peaceful"));
        assert!(!result.context.has_output("aftermath"));
        assert_eq!(result.skipped, vec!["peaceful", "aftermath"]);
        assert!(!sink.started_nodes().contains(&"peaceful".to_string()));
    }

    #[tokio::test]
    async fn test_router_without_match_fails() {
        let graph = GraphBuilder::new("branching")
            .input("judge")
            .router("branch", "{{outputs.judge.output}}", [("Yes", "combat")], None)
            .llm("combat", "fight")
            .build();

        let err = executor()
            .execute(&graph, inputs(json!({"judge": "Maybe"})))
            .await
            .unwrap_err();

        assert_eq!(err.node_ids(), vec!["branch"]);
        assert!(matches!(err.root_cause(), EngineError::NoMatchingRoute(key) if key == "Maybe"));
    }

    fn shout_subgraph() -> GraphDefinition {
        GraphBuilder::new("sub")
            .input("in")
            .function("loud", function("shout"))
            .with_binding("text", "{{outputs.in.output.text}}")
            .final_node("loud")
            .build()
    }

    fn caller() -> GraphDefinition {
        let mut runtime = function(RUN_GRAPH_FUNCTION);
        runtime.options.insert("graphId".into(), json!("sub"));
        GraphBuilder::new("outer")
            .input("topic")
            .function("call", runtime)
            .with_binding("text", "{{outputs.topic.output}}")
            .build()
    }

    #[tokio::test]
    async fn test_run_graph_uses_fresh_child_context() {
        let graphs = InMemoryGraphRegistry::new().with_graph(shout_subgraph());
        let executor = GraphExecutor::new(functions(), Services::new().with_graphs(Arc::new(graphs)));

        let result = executor
            .execute(&caller(), inputs(json!({"topic": "hello"})))
            .await
            .unwrap();

        assert_eq!(result.context.output("call"), Some(&json!({"output": "HELLO"})));
        // Child outputs stay in the child's context
        assert!(!result.context.has_output("loud"));
    }

    #[tokio::test]
    async fn test_run_graph_failures() {
        let err = executor()
            .execute(&caller(), inputs(json!({"topic": "hello"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeExecutionError);
        assert!(matches!(err.root_cause(), EngineError::SubgraphNotFound(id) if id == "sub"));

        let mut failing = shout_subgraph();
        failing.nodes[1].kind = NodeKind::Function(function("fail"));
        let graphs = InMemoryGraphRegistry::new().with_graph(failing);
        let executor = GraphExecutor::new(functions(), Services::new().with_graphs(Arc::new(graphs)));
        let err = executor
            .execute(&caller(), inputs(json!({"topic": "hello"})))
            .await
            .unwrap_err();
        assert_eq!(err.node_ids(), vec!["call", "loud"]);
    }

    #[tokio::test]
    async fn test_recursive_run_graph_hits_depth_limit() {
        let mut runtime = function(RUN_GRAPH_FUNCTION);
        runtime.options.insert("graphId".into(), json!("self"));
        let graph = GraphBuilder::new("self").function("again", runtime).build();

        let graphs = InMemoryGraphRegistry::new().with_graph(graph.clone());
        let config = EngineConfig {
            max_subgraph_depth: 2,
            ..EngineConfig::default()
        };
        let executor = GraphExecutor::new(functions(), Services::new().with_graphs(Arc::new(graphs)))
            .with_config(config);

        let err = executor.execute(&graph, Map::new()).await.unwrap_err();
        assert!(matches!(err.root_cause(), EngineError::DepthExceeded(2)));
        assert_eq!(err.node_ids(), vec!["again", "again", "again"]);
    }

    #[tokio::test]
    async fn test_retry_until_predicate_accepts() {
        let sink = Arc::new(VecEventSink::new());
        let mut executor = executor().with_event_sink(sink.clone());
        executor.functions_mut().register_sync("draft", |_, ctx| {
            let attempt = ctx.variable("attempt").and_then(Value::as_u64).unwrap_or(0);
            Ok(json!(if attempt >= 3 { "done" } else { "" }))
        });
        executor.functions_mut().register_sync("non-empty", |inputs, _| {
            let text = inputs["output"]["output"].as_str().unwrap_or_default();
            Ok(json!(if text.is_empty() { "retry" } else { "ok" }))
        });

        let body = GraphBuilder::new("body")
            .function("draft", function("draft"))
            .final_node("draft")
            .build();
        let graph = GraphBuilder::new("g").retry("polish", body, "non-empty", 4).build();

        let result = executor.execute(&graph, Map::new()).await.unwrap();
        assert_eq!(
            result.context.output("polish"),
            Some(&json!({"output": {"output": "done"}, "attempts": 3}))
        );
        let attempts = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::RetryAttempt { .. }))
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_capped() {
        let config = EngineConfig {
            max_retry_attempts: 2,
            ..EngineConfig::default()
        };
        let mut executor = executor().with_config(config);
        executor.functions_mut().register_sync("never", |_, _| Ok(json!({"status": "retry"})));

        let body = GraphBuilder::new("body")
            .function("loud", function("shout"))
            .build();
        let graph = GraphBuilder::new("g").retry("polish", body, "never", 10).build();

        let err = executor.execute(&graph, Map::new()).await.unwrap_err();
        assert!(matches!(err.root_cause(), EngineError::RetryExhausted { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_output_schema_violation() {
        let mut runtime = function("shout");
        runtime.output_schema = Some(json!({"type": "object", "required": ["missing"]}));
        let graph = GraphBuilder::new("g").function("loud", runtime).build();

        let err = executor().execute(&graph, Map::new()).await.unwrap_err();
        assert_eq!(err.root_cause().kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let graph = GraphBuilder::new("g")
            .function("nap", function("sleepy"))
            .with_timeout_ms(20)
            .build();

        let err = executor().execute(&graph, Map::new()).await.unwrap_err();
        assert!(matches!(err.root_cause(), EngineError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_failure_cancels_wave_mates() {
        let graph = GraphBuilder::new("g")
            .function("nap", function("sleepy"))
            .function("broken", function("fail"))
            .build();

        let outcome =
            tokio::time::timeout(Duration::from_secs(2), executor().execute(&graph, Map::new()))
                .await
                .expect("wave should stop once a member fails");
        let err = outcome.unwrap_err();
        assert_eq!(err.node_ids(), vec!["broken"]);
    }

    #[tokio::test]
    async fn test_cancel_lets_running_node_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut executor = executor();
        let flag = finished.clone();
        executor.functions_mut().register_callback("steady", move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(json!("done"))
            }
        });
        let sink = Arc::new(VecEventSink::new());
        let executor = executor.with_event_sink(sink.clone());

        let graph = GraphBuilder::new("g")
            .function("work", function("steady"))
            .function("after", function("shout"))
            .with_binding("text", "{{outputs.work.output}}")
            .build();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor
            .execute_with_cancel(&graph, Map::new(), cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(finished.load(Ordering::SeqCst));
        let completed: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::NodeCompleted { node_id, .. } => Some(node_id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["work"]);
        assert!(!sink.started_nodes().contains(&"after".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let sink = Arc::new(VecEventSink::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let graph = GraphBuilder::new("g").input("a").build();

        let err = executor()
            .with_event_sink(sink.clone())
            .execute_with_cancel(&graph, Map::new(), cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(sink.started_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_llm_is_provider_error() {
        let graph = GraphBuilder::new("g").llm("writer", "hi").build();
        let executor = GraphExecutor::new(functions(), Services::new());

        let err = executor.execute(&graph, Map::new()).await.unwrap_err();
        assert_eq!(err.root_cause().kind(), ErrorKind::ProviderError);
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let result = executor()
            .execute(&GraphDefinition::new("empty", "Empty"), Map::new())
            .await
            .unwrap();
        assert!(result.outputs.is_empty());
        assert!(result.waves.is_empty());
    }
}
