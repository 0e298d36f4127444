//! Function registry for `function` nodes
//!
//! Maps function names to implementations. Registries are injected into the
//! executor rather than being process-wide, so tests and concurrent runs can
//! each carry their own set.
//!
//! # Usage
//!
//! ```ignore
//! use pipeline_engine::FunctionRegistry;
//!
//! let mut registry = FunctionRegistry::with_builtins();
//! registry.register_sync("shout", |inputs, _ctx| {
//!     let text = inputs.get("text").and_then(|t| t.as_str()).unwrap_or("");
//!     Ok(serde_json::json!(text.to_uppercase()))
//! });
//! ```
//!
//! Built-in functions are collected at link time: a crate submits a
//! [`FunctionDescriptor`] with `inventory::submit!` and
//! [`FunctionRegistry::with_builtins`] picks it up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::services::Services;

/// Reserved function that runs another stored graph as a sub-pipeline
pub const RUN_GRAPH_FUNCTION: &str = "core:runGraph";

/// A callable behind a `function` node
#[async_trait]
pub trait PipelineFunction: Send + Sync {
    /// Run the function with the node's resolved inputs (and static options
    /// merged in under keys the inputs do not already use).
    async fn call(
        &self,
        inputs: Map<String, Value>,
        context: &ExecutionContext,
        services: &Services,
    ) -> Result<Value>;
}

/// Link-time registration entry for a built-in function
pub struct FunctionDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub create: fn() -> Arc<dyn PipelineFunction>,
}

inventory::collect!(FunctionDescriptor);

#[derive(Clone)]
struct RegistryEntry {
    description: String,
    function: Arc<dyn PipelineFunction>,
}

/// Registry of named pipeline functions
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = FunctionRegistry::with_builtins();
/// registry.merge(plugin_registry); // plugin entries win on name clashes
/// ```
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl FunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-filled with every linked [`FunctionDescriptor`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in inventory::iter::<FunctionDescriptor> {
            registry.entries.insert(
                descriptor.name.to_string(),
                RegistryEntry {
                    description: descriptor.description.to_string(),
                    function: (descriptor.create)(),
                },
            );
        }
        log::debug!("Collected {} built-in functions", registry.len());
        registry
    }

    /// Register a function implementation under `name`
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn PipelineFunction>) {
        self.register_described(name, "", function);
    }

    /// Register with a human-readable description
    pub fn register_described(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        function: Arc<dyn PipelineFunction>,
    ) {
        let name = name.into();
        if name == RUN_GRAPH_FUNCTION {
            log::warn!("'{}' is reserved by the executor; registration ignored", name);
            return;
        }
        self.entries.insert(
            name,
            RegistryEntry {
                description: description.into(),
                function,
            },
        );
    }

    /// Register a function using an async callback taking the inputs by value
    pub fn register_callback<F, Fut>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let function = CallbackFunction {
            callback: Box::new(move |inputs| Box::pin(callback(inputs))),
        };
        self.register(name, Arc::new(function));
    }

    /// Register a synchronous function of the inputs and the context
    pub fn register_sync<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(&Map<String, Value>, &ExecutionContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(
            name,
            Arc::new(SyncFunction {
                callback: Box::new(callback),
            }),
        );
    }

    /// Get the implementation registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn PipelineFunction>> {
        self.entries.get(name).map(|e| e.function.clone())
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.description.as_str())
    }

    /// Whether `name` can be called from a node (registered or reserved)
    pub fn is_known(&self, name: &str) -> bool {
        name == RUN_GRAPH_FUNCTION || self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same name.
    pub fn merge(&mut self, other: FunctionRegistry) {
        self.entries.extend(other.entries);
    }
}

type BoxedCallback = Box<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Async callback-based function
struct CallbackFunction {
    callback: BoxedCallback,
}

#[async_trait]
impl PipelineFunction for CallbackFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        _context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        (self.callback)(inputs).await
    }
}

type SyncCallback =
    Box<dyn Fn(&Map<String, Value>, &ExecutionContext) -> Result<Value> + Send + Sync>;

/// Synchronous callback-based function
struct SyncFunction {
    callback: SyncCallback,
}

#[async_trait]
impl PipelineFunction for SyncFunction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        context: &ExecutionContext,
        _services: &Services,
    ) -> Result<Value> {
        (self.callback)(&inputs, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_register_sync_and_call() {
        let mut registry = FunctionRegistry::new();
        registry.register_sync("double", |inputs, _ctx| {
            let n = inputs.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(n * 2))
        });

        let function = registry.get("double").unwrap();
        let out = function
            .call(inputs(json!({"n": 21})), &ExecutionContext::new(), &Services::new())
            .await
            .unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn test_register_callback() {
        let mut registry = FunctionRegistry::new();
        registry.register_callback("fail", |_inputs| async {
            Err::<Value, _>(EngineError::failed("nope"))
        });

        let function = registry.get("fail").unwrap();
        let err = function
            .call(Map::new(), &ExecutionContext::new(), &Services::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailed(_)));
    }

    struct Greeting(&'static str);

    struct Greeter;

    #[async_trait]
    impl PipelineFunction for Greeter {
        async fn call(
            &self,
            inputs: Map<String, Value>,
            _context: &ExecutionContext,
            services: &Services,
        ) -> Result<Value> {
            let greeting = services
                .extensions()
                .get::<Greeting>()
                .map(|g| g.0)
                .unwrap_or("Hello");
            let name = inputs.get("name").and_then(Value::as_str).unwrap_or("stranger");
            Ok(json!(format!("{}, {}", greeting, name)))
        }
    }

    #[tokio::test]
    async fn test_function_reads_host_extension() {
        let mut registry = FunctionRegistry::new();
        registry.register("greet", Arc::new(Greeter));
        let services = Services::new()
            .with_extensions(crate::services::ServiceExtensions::new().with(Greeting("Hail")));

        let out = registry
            .get("greet")
            .unwrap()
            .call(inputs(json!({"name": "Ash"})), &ExecutionContext::new(), &services)
            .await
            .unwrap();
        assert_eq!(out, json!("Hail, Ash"));
    }

    #[test]
    fn test_reserved_name_is_known_but_not_registrable() {
        let mut registry = FunctionRegistry::new();
        registry.register_sync(RUN_GRAPH_FUNCTION, |_, _| Ok(Value::Null));

        assert!(registry.is_empty());
        assert!(registry.is_known(RUN_GRAPH_FUNCTION));
        assert!(!registry.is_known("core:unknown"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = FunctionRegistry::new();
        base.register_sync("a", |_, _| Ok(json!(1)));
        let mut plugin = FunctionRegistry::new();
        plugin.register_described(
            "a",
            "plugin version",
            Arc::new(SyncFunction {
                callback: Box::new(|_, _| Ok(json!(2))),
            }),
        );
        plugin.register_sync("b", |_, _| Ok(json!(3)));

        base.merge(plugin);
        assert_eq!(base.names(), vec!["a", "b"]);
        assert_eq!(base.description("a"), Some("plugin version"));
    }
}
