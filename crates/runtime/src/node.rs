use async_trait::async_trait;

use crate::aggregate::AggregateError;
use crate::cancel::CancelSignal;
use crate::message::{Fragment, Message};
use crate::provider::LlmError;
use crate::state::ConversationState;
use crate::stream::{EventSink, RunEvent};

/// A named unit of work in the graph.
///
/// A node reads the current state and returns the messages to append. It
/// never mutates the state.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(
        &self,
        state: &ConversationState,
        ctx: &NodeContext<'_>,
    ) -> Result<Vec<Message>, NodeError>;
}

/// What the executor hands a node for one execution.
pub struct NodeContext<'a> {
    name: &'a str,
    sink: &'a dyn EventSink,
    cancel: &'a CancelSignal,
}

impl<'a> NodeContext<'a> {
    pub fn new(name: &'a str, sink: &'a dyn EventSink, cancel: &'a CancelSignal) -> Self {
        Self { name, sink, cancel }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Push a fragment to the caller, tagged with this node's name.
    /// A closed sink counts as cancellation.
    pub async fn emit_fragment(&self, fragment: Fragment) -> Result<(), NodeError> {
        self.sink
            .push(RunEvent::Fragment {
                node: self.name.to_string(),
                fragment,
            })
            .await
            .map_err(|_| {
                self.cancel.cancel();
                NodeError::Cancelled
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The model transport failed before or during the stream
    #[error("upstream stream error: {0}")]
    UpstreamStream(#[source] LlmError),
    #[error("malformed stream: {0}")]
    MalformedStream(#[from] AggregateError),
    /// The node was reached in a state it cannot handle
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
