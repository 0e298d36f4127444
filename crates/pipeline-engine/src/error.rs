//! Error types for the pipeline engine

use serde::Serialize;
use thiserror::Error;

use crate::types::NodeId;
use crate::validation::ValidationIssue;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building or running a pipeline graph
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph failed structural validation before any node ran
    #[error("Invalid graph: {}", join_issues(.issues))]
    InvalidGraph { issues: Vec<ValidationIssue> },

    /// Nodes left unscheduled after Kahn's algorithm drained
    #[error("Cycle detected among nodes: {}", .node_ids.join(", "))]
    CycleDetected { node_ids: Vec<NodeId> },

    /// A node runner failed
    #[error("Node '{node_id}' failed: {source}")]
    NodeExecution {
        node_id: NodeId,
        source: Box<EngineError>,
    },

    /// Function input or output did not match its declared schema
    #[error("Schema validation failed for {target}: {}", .messages.join("; "))]
    Validation {
        target: String,
        messages: Vec<String>,
    },

    /// LLM capability failure (transport, auth, quota)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Graph registry lookup missed
    #[error("Subgraph not found: {0}")]
    SubgraphNotFound(String),

    /// Function name not present in the registry
    #[error("Function not registered: {0}")]
    FunctionNotFound(String),

    /// Router condition produced a key with no route and no default
    #[error("No route matches value '{0}'")]
    NoMatchingRoute(String),

    /// Map input list reference did not resolve to a list
    #[error("Map input did not resolve to a list: {0}")]
    NotAList(String),

    /// Retry loop used up every attempt
    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// Retry predicate answered `fail`
    #[error("Retry predicate reported failure on attempt {attempt}")]
    RetryFailed { attempt: u32 },

    /// Node exceeded its time budget
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Sub-pipeline nesting went past the configured limit
    #[error("Sub-pipeline nesting exceeds depth {0}")]
    DepthExceeded(usize),

    /// A second write for a node id already present in the context
    #[error("Output for node '{0}' was already recorded")]
    DuplicateOutput(NodeId),

    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Generic runner failure
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Run was cancelled
    #[error("Execution cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidGraph,
    CycleDetected,
    NodeExecutionError,
    ValidationError,
    ProviderError,
    SubgraphNotFound,
    Cancelled,
    Internal,
}

/// Structured, serializable view of an [`EngineError`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub node_ids: Vec<NodeId>,
}

impl EngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Wrap an error as a failure of `node_id`
    pub fn at_node(node_id: impl Into<NodeId>, err: EngineError) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            source: Box::new(err),
        }
    }

    /// The innermost error beneath any node wrappers
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::NodeExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGraph { .. } => ErrorKind::InvalidGraph,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::NodeExecution { .. } => ErrorKind::NodeExecutionError,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::SubgraphNotFound(_) => ErrorKind::SubgraphNotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }

    /// Node ids this error points at, outermost first
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            Self::CycleDetected { node_ids } => node_ids.clone(),
            Self::InvalidGraph { issues } => {
                let mut ids: Vec<NodeId> = Vec::new();
                for id in issues.iter().filter_map(|i| i.node_id()) {
                    if !ids.iter().any(|existing| existing == id) {
                        ids.push(id.to_string());
                    }
                }
                ids
            }
            Self::NodeExecution { node_id, source } => {
                let mut ids = vec![node_id.clone()];
                ids.extend(source.node_ids());
                ids
            }
            _ => Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            node_ids: self.node_ids(),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
