//! The standard agent topology: a model node that loops through a tool
//! node for as long as the model keeps requesting tools.
//!
//! Flow: START → agent → (tool calls? → tools → agent) → END

use std::sync::Arc;

use steploop_core::EngineConfig;

use crate::graph::{CompiledGraph, GraphBuilder, GraphError, Route, Router, DEFAULT_RECURSION_LIMIT, END};
use crate::model_node::ModelNode;
use crate::provider::ChatModel;
use crate::registry::ToolRegistry;
use crate::state::ConversationState;
use crate::tool_node::ToolNode;
use crate::ToolCallMode;

pub const AGENT_NODE: &str = "agent";
pub const TOOLS_NODE: &str = "tools";

/// Routes to `tool_node` when the last message is an assistant message with
/// pending tool calls, otherwise to END. Earlier history is ignored.
pub fn route_tools(state: &ConversationState, tool_node: &str) -> Route {
    match state.last() {
        Some(last) if last.has_tool_calls() => Route::Node(tool_node.to_string()),
        _ => Route::End,
    }
}

/// [`route_tools`] packaged as a conditional-edge router.
pub fn tools_condition(tool_node: impl Into<String>) -> Router {
    let tool_node = tool_node.into();
    Arc::new(move |state: &ConversationState| route_tools(state, &tool_node))
}

/// Builder for the prebuilt agent graph.
pub struct AgentGraph {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    system_prompt: Option<String>,
    tool_call_mode: ToolCallMode,
    recursion_limit: usize,
    event_buffer: Option<usize>,
}

impl AgentGraph {
    pub fn builder(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            system_prompt: None,
            tool_call_mode: ToolCallMode::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            event_buffer: None,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool_call_mode(mut self, mode: ToolCallMode) -> Self {
        self.tool_call_mode = mode;
        self
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Apply every engine setting from config.
    pub fn from_config(mut self, config: &EngineConfig) -> Self {
        self.system_prompt = config.system_prompt.clone();
        self.tool_call_mode = config.tool_calls;
        self.recursion_limit = config.recursion_limit;
        self.event_buffer = Some(config.event_buffer);
        self
    }

    pub fn build(self) -> Result<CompiledGraph, GraphError> {
        let mut model_node = ModelNode::new(self.model, self.registry.definitions());
        if let Some(prompt) = self.system_prompt {
            model_node = model_node.with_system_prompt(prompt);
        }
        let tool_node = ToolNode::new(self.registry).with_mode(self.tool_call_mode);

        let graph = GraphBuilder::new()
            .add_node(AGENT_NODE, model_node)
            .add_node(TOOLS_NODE, tool_node)
            .set_entry(AGENT_NODE)
            .add_conditional_edge(AGENT_NODE, tools_condition(TOOLS_NODE), [TOOLS_NODE, END])
            .add_edge(TOOLS_NODE, AGENT_NODE)
            .with_recursion_limit(self.recursion_limit)
            .compile()?;

        Ok(match self.event_buffer {
            Some(capacity) => graph.with_event_buffer(capacity),
            None => graph,
        })
    }
}
