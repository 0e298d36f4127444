//! Event types for streaming pipeline progress
//!
//! Events are sent from the executor to any consumer to report run, wave and
//! node lifecycle. They are the structured replacement for ad hoc progress
//! printing; the scheduler itself never emits anything.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Consumer of pipeline events
///
/// Transport agnostic: a channel, a log, or a buffer for tests.
pub trait EventSink: Send + Sync {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// A sink that could not accept an event
#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("event receiver closed")]
    Closed,
    #[error("event buffer poisoned")]
    Poisoned,
}

/// Events emitted during pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Run started
    #[serde(rename_all = "camelCase")]
    RunStarted {
        graph_id: String,
        execution_id: String,
        node_count: usize,
    },

    /// Run completed successfully
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        graph_id: String,
        execution_id: String,
        waves: usize,
    },

    /// Run failed
    #[serde(rename_all = "camelCase")]
    RunFailed {
        graph_id: String,
        execution_id: String,
        error: String,
    },

    /// A wave's gate opened
    #[serde(rename_all = "camelCase")]
    WaveStarted {
        execution_id: String,
        wave: usize,
        node_ids: Vec<String>,
    },

    /// Every member of a wave finished
    #[serde(rename_all = "camelCase")]
    WaveCompleted {
        execution_id: String,
        wave: usize,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: String,
        node_id: String,
        node_type: String,
    },

    /// A node completed and its output was recorded
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        output: serde_json::Value,
    },

    /// A node was skipped by a router decision
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        execution_id: String,
        node_id: String,
    },

    /// A node failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: String,
        node_id: String,
        error: String,
    },

    /// A retry node started another attempt
    #[serde(rename_all = "camelCase")]
    RetryAttempt {
        execution_id: String,
        node_id: String,
        attempt: u32,
        max_attempts: u32,
    },
}

impl PipelineEvent {
    /// Node id the event is about, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeSkipped { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::RetryAttempt { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Discards every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Event sink that forwards every event to the `log` facade at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        match &event {
            PipelineEvent::NodeFailed { node_id, error, .. } => {
                log::warn!("node '{}' failed: {}", node_id, error)
            }
            PipelineEvent::RunFailed { graph_id, error, .. } => {
                log::warn!("run of '{}' failed: {}", graph_id, error)
            }
            other => log::debug!("{:?}", other),
        }
        Ok(())
    }
}

/// Forwards events over an unbounded tokio channel
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    /// A sink plus the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::Closed)
    }
}

/// Buffers events in memory, mostly for assertions in tests
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the buffered events in emission order
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Ids of nodes in `NodeStarted` order
    pub fn started_nodes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::NodeStarted { node_id, .. } => Some(node_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError::Poisoned)?
            .push(event);
        Ok(())
    }
}
