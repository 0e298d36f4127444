//! Pipeline Engine - declarative graph execution for generation pipelines
//!
//! This crate runs graphs of typed nodes (inputs, LLM and function
//! processors, map fan-out, routers, retry loops) in dependency order with
//! maximal safe parallelism. It supports:
//!
//! - Dependencies from explicit edges or from `{{outputs.<id>}}` template
//!   back-references
//! - Wave scheduling (Kahn's algorithm) with concurrent nodes per wave
//! - Map fan-out/fan-in, conditional branching with skip propagation and
//!   bounded retry loops
//! - Sub-pipelines through `core:runGraph`
//!
//! # Architecture
//!
//! - `GraphExecutor`: validates, plans and drives a run
//! - `WaveScheduler` / `DependencyGraph`: ordering
//! - `runners`: one strategy per node kind
//! - `ExecutionContext`: append-only outputs plus shared variables
//! - `EventSink`: structured progress stream (not tied to any transport)
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{EchoLlm, FunctionRegistry, GraphBuilder, GraphExecutor, Services};
//! use std::sync::Arc;
//!
//! let graph = GraphBuilder::new("story")
//!     .input("topic")
//!     .llm("writer", "A tale of {{outputs.topic.output}}")
//!     .build();
//! let executor = GraphExecutor::new(
//!     FunctionRegistry::with_builtins(),
//!     Services::new().with_llm(Arc::new(EchoLlm)),
//! );
//! let result = executor.execute(&graph, inputs).await?;
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph_registry;
pub mod llm;
pub mod registry;
pub mod retry;
pub mod runners;
pub mod scheduler;
pub mod services;
pub mod template;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use config::{ConfigError, EngineConfig, MapScope};
pub use context::ExecutionContext;
pub use dependency::{DependencyGraph, DependencySource};
pub use error::{EngineError, ErrorKind, ErrorReport, Result};
pub use events::{
    ChannelEventSink, EventError, EventSink, LogEventSink, NullEventSink, PipelineEvent,
    VecEventSink,
};
pub use executor::{ExecutionResult, GraphExecutor};
pub use graph_registry::{GraphRegistry, InMemoryGraphRegistry};
pub use llm::{EchoLlm, LlmCapability, RuntimeConfig};
pub use registry::{FunctionDescriptor, FunctionRegistry, PipelineFunction, RUN_GRAPH_FUNCTION};
pub use retry::{RetryDecision, RetryLoop, RetryOutcome};
pub use scheduler::WaveScheduler;
pub use services::{ServiceExtensions, Services};
pub use types::{
    Edge, FunctionRuntime, GraphDefinition, LlmRuntime, Node, NodeId, NodeKind, Port, PortKind,
    Runtime,
};
pub use validation::{validate_graph, ValidationIssue};

// Re-exported for implementors of `FunctionDescriptor` and async traits
pub use async_trait::async_trait;
pub use inventory;
pub use tokio_util::sync::CancellationToken;
