use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Shared state threaded through a run: the ordered message history.
///
/// Append-only. Nodes never touch it directly; the executor appends the
/// messages a node returns, so any reader sees complete messages only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from an existing history.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// The reducer: append a node's output to the history.
    pub fn append(&mut self, delta: Vec<Message>) {
        self.messages.extend(delta);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for ConversationState {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}
