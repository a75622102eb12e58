use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateError;
use crate::cancel::CancelSignal;
use crate::graph::{CompiledGraph, Edge, Route, START};
use crate::node::{NodeContext, NodeError};
use crate::provider::LlmError;
use crate::state::ConversationState;
use crate::stream::{ChannelSink, EventSink, NullSink, RunEvent, RunItem};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Transport failure while streaming the model response
    #[error("upstream stream error in node '{node}': {source}")]
    UpstreamStream {
        node: String,
        #[source]
        source: LlmError,
    },
    /// The model stream ended without establishing a role
    #[error("malformed stream in node '{node}': {source}")]
    MalformedStream {
        node: String,
        #[source]
        source: AggregateError,
    },
    /// A node ran in a state it cannot handle, usually a routing bug
    #[error("precondition failed in node '{node}': {message}")]
    Precondition { node: String, message: String },
    #[error("node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("recursion limit of {0} node executions reached without hitting END")]
    RecursionLimit(usize),
    #[error("router of node '{from}' returned unknown node '{to}'")]
    UnknownRoute { from: String, to: String },
    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    fn from_node(node: &str, error: NodeError) -> Self {
        let node = node.to_string();
        match error {
            NodeError::UpstreamStream(source) => RunError::UpstreamStream { node, source },
            NodeError::MalformedStream(source) => RunError::MalformedStream { node, source },
            NodeError::Precondition(message) => RunError::Precondition { node, message },
            NodeError::Cancelled => RunError::Cancelled,
            NodeError::Other(source) => RunError::Node { node, source },
        }
    }
}

impl CompiledGraph {
    /// Run to completion without streaming and return the final state.
    pub async fn invoke(&self, initial: ConversationState) -> Result<ConversationState, RunError> {
        self.run_with_sink(initial, &NullSink, &CancelSignal::new()).await
    }

    /// The run loop. Every event goes to `sink`; the final state is returned
    /// and also pushed as [`RunEvent::Finished`].
    pub async fn run_with_sink(
        &self,
        initial: ConversationState,
        sink: &dyn EventSink,
        cancel: &CancelSignal,
    ) -> Result<ConversationState, RunError> {
        let mut state = initial;
        let mut current = self.entry.clone();
        info!(entry = %current, history = state.len(), "Starting graph run");

        for step in 0..self.recursion_limit {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| RunError::UnknownRoute {
                    from: START.to_string(),
                    to: current.clone(),
                })?;

            debug!(step, node = %current, "executing node");
            let ctx = NodeContext::new(&current, sink, cancel);
            let delta = node
                .run(&state, &ctx)
                .await
                .map_err(|e| RunError::from_node(&current, e))?;

            // The reducer: append, then publish the delta.
            state.append(delta.clone());
            sink.push(RunEvent::Update {
                node: current.clone(),
                messages: delta,
            })
            .await
            .map_err(|_| {
                cancel.cancel();
                RunError::Cancelled
            })?;

            let next = match self.edges.get(&current) {
                Some(Edge::Direct(route)) => route.clone(),
                Some(Edge::Conditional { router, .. }) => {
                    let route = router(&state);
                    debug!(from = %current, to = %route, "router decided");
                    route
                }
                // compile() guarantees every node has an edge.
                None => Route::End,
            };

            match next {
                Route::End => {
                    info!(steps = step + 1, history = state.len(), "Graph run complete");
                    // A caller that stops listening after the last update
                    // still gets its state back from this function.
                    let _ = sink
                        .push(RunEvent::Finished {
                            state: state.clone(),
                        })
                        .await;
                    return Ok(state);
                }
                Route::Node(name) if self.nodes.contains_key(&name) => current = name,
                Route::Node(name) => {
                    return Err(RunError::UnknownRoute {
                        from: current,
                        to: name,
                    })
                }
            }
        }

        warn!(limit = self.recursion_limit, "recursion limit reached");
        Err(RunError::RecursionLimit(self.recursion_limit))
    }

    /// Start a run on the tokio runtime and stream its events.
    ///
    /// The stream yields `Fragment` and `Update` events as they happen and
    /// ends with `Finished` or a single `Err`. Dropping it cancels the run.
    pub fn stream(self: Arc<Self>, initial: ConversationState) -> RunStream {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancelSignal::new();
        let run_cancel = cancel.clone();

        tokio::spawn(async move {
            let sink = ChannelSink::new(tx.clone());
            if let Err(e) = self.run_with_sink(initial, &sink, &run_cancel).await {
                debug!(error = %e, "streamed run ended with error");
                // The receiver may already be gone.
                let _ = tx.send(Err(e)).await;
            }
        });

        RunStream { rx, cancel }
    }
}

/// Lazy, finite, non-restartable sequence of run events.
pub struct RunStream {
    rx: mpsc::Receiver<RunItem>,
    cancel: CancelSignal,
}

impl RunStream {
    /// Stop the run. The model stream is dropped at once; a tool already
    /// executing is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream; returns the final state or the run's error.
    pub async fn final_state(mut self) -> Result<ConversationState, RunError> {
        use futures::StreamExt;
        while let Some(item) = self.next().await {
            if let RunEvent::Finished { state } = item? {
                return Ok(state);
            }
        }
        Err(RunError::Cancelled)
    }
}

impl Stream for RunStream {
    type Item = RunItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
