use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancelSignal;

/// Describes a tool's interface for LLM consumption.
/// Passed unchanged to the model on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "get_items")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected arguments
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Context passed to tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    cancel: CancelSignal,
}

impl ToolContext {
    pub fn new(cancel: CancelSignal) -> Self {
        Self { cancel }
    }

    /// Whether the run that invoked this tool has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the run is cancelled. Long-running tools can select on
    /// this to stop early; the run waits for the tool either way.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with already-parsed JSON arguments.
    async fn invoke(&self, args: Value, context: &ToolContext) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

/// Adapts an async closure into a [`Tool`].
///
/// ```ignore
/// let tool = FnTool::new(definition, |args| async move {
///     Ok(format!("got {args}"))
/// });
/// ```
pub struct FnTool {
    definition: ToolDefinition,
    handler: Box<dyn Fn(Value) -> BoxedToolFuture + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            definition,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn invoke(&self, args: Value, _context: &ToolContext) -> Result<String, ToolError> {
        (self.handler)(args).await
    }
}

/// Simple echo tool for testing purposes.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes back the input message. For testing.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn invoke(&self, args: Value, _context: &ToolContext) -> Result<String, ToolError> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'message' field".to_string()))?;

        Ok(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_serialization() {
        let def = ToolDefinition::new("test_tool", "A test tool", serde_json::json!({"type": "object"}));
        let json = serde_json::to_string(&def).unwrap();
        let roundtrip: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, def);
        assert_eq!(def.to_string(), "test_tool(A test tool)");
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        assert_eq!(tool.definition().name, "echo");

        let result = tool
            .invoke(serde_json::json!({"message": "hello world"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result, "hello world");
    }

    #[tokio::test]
    async fn test_echo_tool_missing_field() {
        let err = EchoTool
            .invoke(serde_json::json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_fn_tool() {
        let tool = FnTool::new(
            ToolDefinition::new("shout", "Uppercases text", serde_json::json!({"type": "object"})),
            |args: Value| async move {
                let text = args["text"].as_str().unwrap_or_default().to_uppercase();
                Ok::<_, ToolError>(text)
            },
        );
        assert_eq!(tool.definition().name, "shout");
        let out = tool
            .invoke(serde_json::json!({"text": "quiet"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, "QUIET");
    }

    #[tokio::test]
    async fn test_context_reports_cancellation() {
        let signal = CancelSignal::new();
        let ctx = ToolContext::new(signal.clone());
        assert!(!ctx.is_cancelled());
        signal.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }
}
