use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::aggregate::AggregateState;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::provider::ChatModel;
use crate::state::ConversationState;
use crate::tool::ToolDefinition;

/// Calls the model once and turns its stream into one assistant message.
pub struct ModelNode {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolDefinition>,
    system_prompt: Option<String>,
}

impl ModelNode {
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            model,
            tools,
            system_prompt: None,
        }
    }

    /// Prepend a system message to every request without storing it in history.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn request_messages(&self, state: &ConversationState) -> Vec<Message> {
        let mut messages = Vec::with_capacity(state.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend_from_slice(state.messages());
        messages
    }
}

#[async_trait]
impl Node for ModelNode {
    async fn run(
        &self,
        state: &ConversationState,
        ctx: &NodeContext<'_>,
    ) -> Result<Vec<Message>, NodeError> {
        debug!(
            node = ctx.name(),
            provider = self.model.provider_name(),
            history = state.len(),
            tools = self.tools.len(),
            "requesting model stream"
        );

        let connect = self
            .model
            .stream_chat_completion(self.request_messages(state), self.tools.clone());
        let mut stream = tokio::select! {
            biased;
            _ = ctx.cancel_signal().cancelled() => {
                debug!(node = ctx.name(), "model call cancelled before streaming");
                return Err(NodeError::Cancelled);
            }
            connected = connect => connected.map_err(NodeError::UpstreamStream)?,
        };

        let mut aggregate = AggregateState::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel_signal().cancelled() => {
                    debug!(node = ctx.name(), "model stream cancelled");
                    return Err(NodeError::Cancelled);
                }
                next = stream.next() => next,
            };

            let Some(item) = next else { break };
            let fragment = item.map_err(NodeError::UpstreamStream)?;
            trace!(node = ctx.name(), kind = ?fragment.kind(), "fragment");

            // Observers see the fragment before it is folded.
            ctx.emit_fragment(fragment.clone()).await?;
            aggregate.push(&fragment);
        }

        let fragments = aggregate.fragment_count();
        let message = aggregate.finish()?;
        debug!(
            node = ctx.name(),
            fragments,
            content_len = message.content.len(),
            tool_calls = message.tool_calls.len(),
            "model turn aggregated"
        );
        Ok(vec![message])
    }
}
