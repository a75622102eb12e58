//! Folds streamed [`Fragment`]s into one complete assistant [`Message`].
//!
//! The fold is pure: it never parses tool arguments, so a slot whose
//! arguments never become valid JSON is surfaced as-is and left for the
//! tool node to reject.

use std::collections::BTreeMap;

use tracing::trace;

use crate::message::{Fragment, Message, Role, ToolCall};

/// A tool call still being assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulator owned by a single in-flight model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    role: Option<Role>,
    content: String,
    /// Call-slot index -> partial call. Ordered so `finish` emits by slot.
    slots: BTreeMap<usize, PartialToolCall>,
    fragments: usize,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure fold step.
    pub fn merge(mut self, fragment: &Fragment) -> Self {
        self.push(fragment);
        self
    }

    /// In-place fold step.
    pub fn push(&mut self, fragment: &Fragment) {
        self.fragments += 1;

        if self.role.is_none() {
            if let Some(role) = fragment.role {
                self.role = Some(role);
            }
        }

        if let Some(text) = fragment.text_delta() {
            self.content.push_str(text);
        }

        if let Some(delta) = &fragment.tool_call {
            let slot = delta.slot();
            let call = self.slots.entry(slot).or_default();
            // id and name are fixed by whichever delta supplies them first.
            if call.id.is_none() {
                call.id = delta.id.clone();
            }
            if call.name.is_none() {
                call.name = delta.name.clone();
            }
            call.arguments.push_str(&delta.arguments);
            trace!(slot, len = call.arguments.len(), "tool-call arguments grew");
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of fragments folded so far.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn tool_call_count(&self) -> usize {
        self.slots.len()
    }

    /// Close the fold and build the final message.
    pub fn finish(self) -> Result<Message, AggregateError> {
        let tool_calls: Vec<ToolCall> = self
            .slots
            .into_values()
            .map(|call| ToolCall {
                id: call.id.unwrap_or_default(),
                name: call.name.unwrap_or_default(),
                arguments: call.arguments,
            })
            .collect();

        let role = match self.role {
            Some(role) => role,
            None if self.content.is_empty() && tool_calls.is_empty() => Role::Assistant,
            None => {
                return Err(AggregateError::MissingRole {
                    fragments: self.fragments,
                })
            }
        };

        Ok(Message {
            role,
            content: self.content,
            tool_calls,
            tool_call_id: None,
            name: None,
        })
    }
}

/// Fold a complete fragment sequence.
pub fn aggregate<'a, I>(fragments: I) -> Result<Message, AggregateError>
where
    I: IntoIterator<Item = &'a Fragment>,
{
    fragments
        .into_iter()
        .fold(AggregateState::new(), AggregateState::merge)
        .finish()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("stream produced output but never set a role ({fragments} fragments)")]
    MissingRole { fragments: usize },
}
