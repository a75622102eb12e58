use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a message in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier assigned by the model (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Serialized JSON arguments, exactly as assembled from the stream
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the assembled arguments. Partial argument strings are not
    /// guaranteed to parse.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// One entry of the conversation history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-role messages: the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on tool-role messages: the tool that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Result of a tool invocation, answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// A tool-role message carrying a recovered error back to the model.
    /// The content is `{"error": kind, "message": detail}`.
    pub fn tool_error(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        kind: &str,
        detail: impl Into<String>,
    ) -> Self {
        let payload = serde_json::json!({
            "error": kind,
            "message": detail.into(),
        });
        Self::tool_result(tool_call_id, name, payload.to_string())
    }

    /// True for an assistant message that requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Incremental piece of a tool call inside a [`Fragment`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Call-slot index; `None` means slot 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Text appended to the slot's arguments.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallDelta {
    /// Opening delta of a slot: carries the id and the name.
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: String::new(),
        }
    }

    /// Continuation delta: only an arguments chunk.
    pub fn arguments(index: usize, chunk: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            arguments: chunk.into(),
            ..Self::default()
        }
    }

    pub fn slot(&self) -> usize {
        self.index.unwrap_or(0)
    }
}

/// One streamed unit of a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallDelta>,
}

/// What a fragment mainly carries, for callers rendering partial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Text,
    ToolCall,
    Role,
    Empty,
}

impl Fragment {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_call: Some(delta),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Non-empty text delta, if any.
    pub fn text_delta(&self) -> Option<&str> {
        self.content.as_deref().filter(|t| !t.is_empty())
    }

    pub fn kind(&self) -> FragmentKind {
        if self.tool_call.is_some() {
            FragmentKind::ToolCall
        } else if self.text_delta().is_some() {
            FragmentKind::Text
        } else if self.role.is_some() {
            FragmentKind::Role
        } else {
            FragmentKind::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_tool_result_shape() {
        let msg = Message::tool_result("call_1", "get_items", "socks");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["name"], "get_items");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_tool_error_payload() {
        let msg = Message::tool_error("call_1", "nope", "unknown_tool", "Unknown tool: nope");
        let payload: Value = serde_json::from_str(&msg.content).unwrap();
        assert_eq!(payload["error"], "unknown_tool");
        assert_eq!(payload["message"], "Unknown tool: nope");
        assert_eq!(msg.role, Role::Tool);
    }

    #[test]
    fn test_has_tool_calls_requires_assistant() {
        let call = ToolCall::new("c", "echo", "{}");
        assert!(Message::assistant_with_tool_calls("", vec![call.clone()]).has_tool_calls());
        assert!(!Message::assistant("hi").has_tool_calls());

        let mut odd = Message::user("hi");
        odd.tool_calls.push(call);
        assert!(!odd.has_tool_calls());
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall::new("c", "get_items", r#"{"place":"bedroom"}"#);
        assert_eq!(call.parse_arguments().unwrap()["place"], "bedroom");
        assert!(ToolCall::new("c", "x", r#"{"place":"#).parse_arguments().is_err());
    }

    #[test]
    fn test_fragment_kind() {
        assert_eq!(Fragment::text("hi").kind(), FragmentKind::Text);
        assert_eq!(Fragment::text("").kind(), FragmentKind::Empty);
        assert_eq!(Fragment::role(Role::Assistant).kind(), FragmentKind::Role);
        assert_eq!(
            Fragment::tool_call(ToolCallDelta::arguments(0, "{")).kind(),
            FragmentKind::ToolCall
        );
    }
}
