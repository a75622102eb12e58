use crate::aggregate::{AggregateError, AggregateState};
use crate::message::{Fragment, Message};
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Finite, non-restartable stream of response fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, LlmError>> + Send>>;

/// The model collaborator: anything that can stream a chat completion.
///
/// Defined by the consumer (the model node), not the provider. Transport,
/// authentication and retries all live behind implementations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stream a response for `messages` with `tools` available.
    async fn stream_chat_completion(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<FragmentStream, LlmError>;

    /// Non-streaming convenience: folds the whole response into one message.
    async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<Message, LlmError> {
        use futures::StreamExt;
        let mut stream = self.stream_chat_completion(messages, tools).await?;
        let mut state = AggregateState::new();
        while let Some(fragment) = stream.next().await {
            state.push(&fragment?);
        }
        state.finish().map_err(LlmError::from)
    }

    /// Provider name for logging/debugging (e.g., "openai", "mock")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AggregateError> for LlmError {
    fn from(e: AggregateError) -> Self {
        LlmError::InvalidResponse(e.to_string())
    }
}

/// Scripted model for testing the run loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::message::{Role, ToolCallDelta};
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::{Mutex, MutexGuard};

    /// One scripted stream item.
    pub type ScriptItem = Result<Fragment, LlmError>;

    /// A request the model received.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub messages: Vec<Message>,
        pub tools: Vec<ToolDefinition>,
    }

    /// A model that replays queued responses in FIFO order and records
    /// every request it receives.
    #[derive(Default)]
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Vec<ScriptItem>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a raw response, which may fail mid-stream.
        pub fn queue_response(&self, items: Vec<ScriptItem>) {
            lock(&self.responses).push_back(items);
        }

        /// Queue a response built from fragments only.
        pub fn queue_fragments(&self, fragments: Vec<Fragment>) {
            self.queue_response(fragments.into_iter().map(Ok).collect());
        }

        /// Queue a plain assistant text response streamed as `parts`.
        pub fn queue_text(&self, parts: &[&str]) {
            let mut fragments = vec![Fragment::role(Role::Assistant)];
            fragments.extend(parts.iter().map(|p| Fragment::text(*p)));
            self.queue_fragments(fragments);
        }

        /// Queue a single tool call whose arguments arrive in `chunks`.
        pub fn queue_tool_call(&self, id: &str, name: &str, chunks: &[&str]) {
            let mut fragments = vec![
                Fragment::role(Role::Assistant),
                Fragment::tool_call(ToolCallDelta::start(0, id, name)),
            ];
            fragments.extend(
                chunks
                    .iter()
                    .map(|c| Fragment::tool_call(ToolCallDelta::arguments(0, *c))),
            );
            self.queue_fragments(fragments);
        }

        /// Requests received so far, oldest first.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            lock(&self.requests).clone()
        }

        pub fn remaining(&self) -> usize {
            lock(&self.responses).len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn stream_chat_completion(
            &self,
            messages: Vec<Message>,
            tools: Vec<ToolDefinition>,
        ) -> Result<FragmentStream, LlmError> {
            lock(&self.requests).push(RecordedRequest { messages, tools });
            let items = lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| vec![Ok(Fragment::role(Role::Assistant))]);
            Ok(Box::pin(stream::iter(items)))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
