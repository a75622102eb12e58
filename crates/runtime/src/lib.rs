pub mod aggregate;
pub mod cancel;
pub mod executor;
pub mod graph;
pub mod message;
pub mod model_node;
pub mod node;
pub mod prebuilt;
pub mod provider;
pub mod registry;
pub mod state;
pub mod stream;
pub mod tool;
pub mod tool_node;

pub use aggregate::{aggregate, AggregateError, AggregateState};
pub use cancel::CancelSignal;
pub use executor::{RunError, RunStream};
pub use graph::{CompiledGraph, GraphBuilder, GraphError, Route, Router, END, START};
pub use message::{Fragment, FragmentKind, Message, Role, ToolCall, ToolCallDelta};
pub use model_node::ModelNode;
pub use node::{Node, NodeContext, NodeError};
pub use prebuilt::{tools_condition, AgentGraph, AGENT_NODE, TOOLS_NODE};
pub use provider::{ChatModel, FragmentStream, LlmError};
pub use registry::{RegistryError, ToolRegistry};
pub use state::ConversationState;
pub use stream::{CollectSink, EventSink, NullSink, RunEvent, SinkClosed};
pub use steploop_core::{EngineConfig, ToolCallMode};
pub use tool::{EchoTool, FnTool, Tool, ToolContext, ToolDefinition, ToolError};
pub use tool_node::{ToolCallError, ToolNode};
