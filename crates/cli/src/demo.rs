//! A deterministic household assistant: enough model behaviour to drive the
//! agent graph end to end without network access.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::Value;

use steploop_runtime::{
    ChatModel, FnTool, Fragment, FragmentStream, LlmError, Message, Role, ToolCallDelta,
    ToolDefinition, ToolError,
};

pub const GET_ITEMS: &str = "get_items";

/// Places the demo knows about, with what is in them.
const HOUSEHOLD: &[(&str, &str)] = &[
    ("bedroom", "socks, shoes and dust bunnies"),
    ("shelf", "books, pencils and pictures"),
    ("kitchen", "cat snacks and a kettle"),
];

/// Delay between streamed fragments, so the output visibly streams.
const FRAGMENT_DELAY: Duration = Duration::from_millis(30);

/// Look up what is in `place`. Matches on substrings, so "the bedroom" works.
pub fn items_in(place: &str) -> Option<&'static str> {
    let place = place.to_lowercase();
    HOUSEHOLD
        .iter()
        .find(|(known, _)| place.contains(known))
        .map(|(_, items)| *items)
}

pub fn get_items_tool() -> FnTool {
    FnTool::new(
        ToolDefinition::new(
            GET_ITEMS,
            "Use this tool to look up which items are in the given place.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "place": {
                        "type": "string",
                        "description": "A room or piece of furniture"
                    }
                },
                "required": ["place"]
            }),
        ),
        |args: Value| async move {
            let place = args["place"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidInput("missing 'place'".to_string()))?;
            Ok::<_, ToolError>(items_in(place).unwrap_or("nothing I know of").to_string())
        },
    )
}

/// Decides its next turn from the last message in the request.
///
/// - last message is a `get_items` result: answer with a summary
/// - question names a known place: call `get_items` for it
/// - otherwise: answer without tools
pub struct DemoModel;

impl DemoModel {
    fn plan(messages: &[Message]) -> Vec<Fragment> {
        let mut fragments = vec![Fragment::role(Role::Assistant)];

        match messages.last() {
            Some(last) if last.role == Role::Tool => {
                let place = Self::place_asked(messages).unwrap_or("that place");
                let answer = format!("In the {place}, you have {}.", last.content);
                fragments.extend(chunk_words(&answer).into_iter().map(Fragment::text));
            }
            _ => match Self::place_asked(messages) {
                Some(place) => {
                    let call_id = format!("call_{}", messages.len());
                    let args = serde_json::json!({ "place": place }).to_string();
                    fragments.push(Fragment::tool_call(ToolCallDelta::start(0, call_id, GET_ITEMS)));
                    for chunk in chunk_chars(&args, 8) {
                        fragments.push(Fragment::tool_call(ToolCallDelta::arguments(0, chunk)));
                    }
                }
                None => {
                    let places: Vec<_> = HOUSEHOLD.iter().map(|(p, _)| *p).collect();
                    let answer = format!("I can only look inside the {}.", places.join(" or the "));
                    fragments.extend(chunk_words(&answer).into_iter().map(Fragment::text));
                }
            },
        }

        fragments
    }

    /// The known place named in the most recent user message.
    fn place_asked(messages: &[Message]) -> Option<&'static str> {
        let question = messages.iter().rev().find(|m| m.role == Role::User)?;
        let lowered = question.content.to_lowercase();
        HOUSEHOLD
            .iter()
            .map(|(place, _)| *place)
            .find(|place| lowered.contains(place))
    }
}

#[async_trait]
impl ChatModel for DemoModel {
    async fn stream_chat_completion(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
    ) -> Result<FragmentStream, LlmError> {
        let fragments = Self::plan(&messages);
        let paced = stream::iter(fragments).then(|fragment| async move {
            tokio::time::sleep(FRAGMENT_DELAY).await;
            Ok::<_, LlmError>(fragment)
        });
        Ok(Box::pin(paced))
    }

    fn provider_name(&self) -> &str {
        "demo"
    }
}

/// Split text into word-sized deltas, keeping the separating spaces.
fn chunk_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
