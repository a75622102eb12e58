use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::executor::RunError;
use crate::message::{Fragment, Message};
use crate::state::ConversationState;

/// Events emitted while a graph runs.
/// For model nodes, `Fragment` events arrive before the node's `Update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A raw fragment from the model, pushed before it is aggregated
    Fragment { node: String, fragment: Fragment },
    /// Messages a node returned, already appended to the state
    Update { node: String, messages: Vec<Message> },
    /// The run reached the terminal marker
    Finished { state: ConversationState },
}

impl RunEvent {
    /// Name of the node that produced this event, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            RunEvent::Fragment { node, .. } | RunEvent::Update { node, .. } => Some(node),
            RunEvent::Finished { .. } => None,
        }
    }
}

/// The receiving side hung up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Caller-visible streaming channel for a run.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn push(&self, event: RunEvent) -> Result<(), SinkClosed>;
}

/// Discards every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn push(&self, _event: RunEvent) -> Result<(), SinkClosed> {
        Ok(())
    }
}

/// Items carried by a streamed run's channel.
pub type RunItem = Result<RunEvent, RunError>;

/// Forwards events into a bounded channel, applying backpressure.
pub(crate) struct ChannelSink {
    tx: mpsc::Sender<RunItem>,
}

impl ChannelSink {
    pub(crate) fn new(tx: mpsc::Sender<RunItem>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn push(&self, event: RunEvent) -> Result<(), SinkClosed> {
        self.tx.send(Ok(event)).await.map_err(|_| SinkClosed)
    }
}

/// Buffers every event in memory.
#[derive(Default)]
pub struct CollectSink {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventSink for CollectSink {
    async fn push(&self, event: RunEvent) -> Result<(), SinkClosed> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }
}
