use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::message::{Message, Role, ToolCall};
use crate::node::{Node, NodeContext, NodeError};
use crate::registry::ToolRegistry;
use crate::state::ConversationState;
use crate::tool::ToolContext;
use crate::ToolCallMode;

/// Errors caused by the model's own tool requests. They are written back
/// into history as tool-role messages rather than failing the run.
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for '{name}': {source}")]
    ArgumentParse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Tool '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

impl ToolCallError {
    /// Short machine-readable kind used in the error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolCallError::UnknownTool(_) => "unknown_tool",
            ToolCallError::ArgumentParse { .. } => "invalid_arguments",
            ToolCallError::Failed { .. } => "tool_failed",
        }
    }
}

/// Executes the tool calls of the last assistant message.
pub struct ToolNode {
    registry: Arc<ToolRegistry>,
    mode: ToolCallMode,
}

impl ToolNode {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            mode: ToolCallMode::All,
        }
    }

    pub fn with_mode(mut self, mode: ToolCallMode) -> Self {
        self.mode = mode;
        self
    }

    async fn execute(&self, call: &ToolCall, context: &ToolContext) -> Result<String, ToolCallError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolCallError::UnknownTool(call.name.clone()))?;

        let args = call
            .parse_arguments()
            .map_err(|source| ToolCallError::ArgumentParse {
                name: call.name.clone(),
                source,
            })?;

        tool.invoke(args, context)
            .await
            .map_err(|e| ToolCallError::Failed {
                name: call.name.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn run(
        &self,
        state: &ConversationState,
        ctx: &NodeContext<'_>,
    ) -> Result<Vec<Message>, NodeError> {
        let last = state
            .last()
            .ok_or_else(|| NodeError::Precondition("history is empty".to_string()))?;
        if last.role != Role::Assistant {
            return Err(NodeError::Precondition(format!(
                "last message has role {:?}, expected assistant",
                last.role
            )));
        }
        if last.tool_calls.is_empty() {
            return Err(NodeError::Precondition(
                "last assistant message has no tool calls".to_string(),
            ));
        }

        let calls = match self.mode {
            ToolCallMode::All => &last.tool_calls[..],
            ToolCallMode::FirstOnly => &last.tool_calls[..1],
        };
        info!(node = ctx.name(), count = calls.len(), "Executing tool calls");

        let context = ToolContext::new(ctx.cancel_signal().clone());
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            // A tool already running is awaited; cancellation is honoured
            // between calls.
            if ctx.is_cancelled() {
                return Err(NodeError::Cancelled);
            }

            let message = match self.execute(call, &context).await {
                Ok(content) => {
                    debug!(tool = %call.name, id = %call.id, len = content.len(), "tool call succeeded");
                    Message::tool_result(&call.id, &call.name, content)
                }
                Err(e) => {
                    warn!(tool = %call.name, id = %call.id, error = %e, "tool call failed, reporting to model");
                    Message::tool_error(&call.id, &call.name, e.kind(), e.to_string())
                }
            };
            results.push(message);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSignal;
    use crate::stream::NullSink;
    use crate::tool::{EchoTool, FnTool, ToolDefinition, ToolError};
    use serde_json::Value;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry
            .register(FnTool::new(
                ToolDefinition::new("explode", "Always fails", serde_json::json!({"type": "object"})),
                |_| async { Err::<String, _>(ToolError::ExecutionFailed("boom".to_string())) },
            ))
            .unwrap();
        Arc::new(registry)
    }

    fn state_with_calls(calls: Vec<ToolCall>) -> ConversationState {
        ConversationState::from(vec![
            Message::user("go"),
            Message::assistant_with_tool_calls("", calls),
        ])
    }

    async fn run(node: &ToolNode, state: &ConversationState) -> Result<Vec<Message>, NodeError> {
        let cancel = CancelSignal::new();
        let ctx = NodeContext::new("tools", &NullSink, &cancel);
        node.run(state, &ctx).await
    }

    fn payload(msg: &Message) -> Value {
        serde_json::from_str(&msg.content).unwrap()
    }

    #[tokio::test]
    async fn test_successful_call() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![ToolCall::new("call_1", "echo", r#"{"message":"hi"}"#)]);

        let out = run(&node, &state).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::Tool);
        assert_eq!(out[0].content, "hi");
        assert_eq!(out[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(out[0].name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_message() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![ToolCall::new("call_1", "teleport", "{}")]);

        let out = run(&node, &state).await.unwrap();
        assert_eq!(out[0].role, Role::Tool);
        assert_eq!(payload(&out[0])["error"], "unknown_tool");
        assert_eq!(out[0].name.as_deref(), Some("teleport"));
    }

    #[tokio::test]
    async fn test_bad_arguments_become_error_message() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![ToolCall::new("call_1", "echo", r#"{"message":"#)]);

        let out = run(&node, &state).await.unwrap();
        assert_eq!(payload(&out[0])["error"], "invalid_arguments");
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_error_message() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![ToolCall::new("call_1", "explode", "{}")]);

        let out = run(&node, &state).await.unwrap();
        let body = payload(&out[0]);
        assert_eq!(body["error"], "tool_failed");
        assert!(body["message"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_all_mode_runs_every_call_in_order() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![
            ToolCall::new("call_1", "echo", r#"{"message":"one"}"#),
            ToolCall::new("call_2", "echo", r#"{"message":"two"}"#),
        ]);

        let out = run(&node, &state).await.unwrap();
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_first_only_mode() {
        let node = ToolNode::new(registry()).with_mode(ToolCallMode::FirstOnly);
        let state = state_with_calls(vec![
            ToolCall::new("call_1", "echo", r#"{"message":"one"}"#),
            ToolCall::new("call_2", "echo", r#"{"message":"two"}"#),
        ]);

        let out = run(&node, &state).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_precondition_without_tool_calls() {
        let node = ToolNode::new(registry());

        let no_calls = ConversationState::from(vec![Message::assistant("done")]);
        assert!(matches!(run(&node, &no_calls).await, Err(NodeError::Precondition(_))));

        let user_last = ConversationState::from(vec![Message::user("hi")]);
        assert!(matches!(run(&node, &user_last).await, Err(NodeError::Precondition(_))));

        assert!(matches!(
            run(&node, &ConversationState::new()).await,
            Err(NodeError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let node = ToolNode::new(registry());
        let state = state_with_calls(vec![ToolCall::new("call_1", "echo", r#"{"message":"hi"}"#)]);

        let cancel = CancelSignal::new();
        cancel.cancel();
        let ctx = NodeContext::new("tools", &NullSink, &cancel);
        assert!(matches!(node.run(&state, &ctx).await, Err(NodeError::Cancelled)));
    }
}
