//! End-to-end runs of the prebuilt agent graph against a scripted model.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use steploop_runtime::provider::mock::ScriptedModel;
use steploop_runtime::{
    AgentGraph, ChatModel, CompiledGraph, ConversationState, FnTool, FragmentKind, LlmError,
    Message, Role, RunError, RunEvent, ToolDefinition, ToolError, ToolRegistry, AGENT_NODE,
    TOOLS_NODE,
};

fn get_items_tool() -> FnTool {
    FnTool::new(
        ToolDefinition::new(
            "get_items",
            "Use this tool to look up which items are in the given place.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "place": { "type": "string" }
                },
                "required": ["place"]
            }),
        ),
        |args: Value| async move {
            match args["place"].as_str() {
                Some(place) if place.contains("bed") => Ok("socks, shoes and dust bunnies".to_string()),
                Some(place) if place.contains("shelf") => Ok("books, pencils and pictures".to_string()),
                Some(_) => Ok("cat snacks".to_string()),
                None => Err(ToolError::InvalidInput("missing 'place'".to_string())),
            }
        },
    )
}

fn agent_graph(model: Arc<ScriptedModel>) -> CompiledGraph {
    let mut registry = ToolRegistry::new();
    registry.register(get_items_tool()).unwrap();
    AgentGraph::builder(model as Arc<dyn ChatModel>, Arc::new(registry))
        .build()
        .unwrap()
}

fn bedroom_question() -> ConversationState {
    ConversationState::from(vec![Message::user("what's in the bedroom")])
}

fn queue_bedroom_script(model: &ScriptedModel) {
    model.queue_tool_call("call_1", "get_items", &["{\"pla", "ce\":\"bed", "room\"}"]);
    model.queue_text(&["In the bedroom", ", you have socks, shoes, and dust bunnies."]);
}

#[tokio::test]
async fn bedroom_scenario_runs_tool_then_answers() {
    let model = Arc::new(ScriptedModel::new());
    queue_bedroom_script(&model);
    let graph = agent_graph(model.clone());

    let state = graph.invoke(bedroom_question()).await.unwrap();
    let messages = state.messages();
    assert_eq!(messages.len(), 4);

    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].tool_calls.len(), 1);
    assert_eq!(messages[1].tool_calls[0].name, "get_items");
    assert_eq!(messages[1].tool_calls[0].arguments, r#"{"place":"bedroom"}"#);

    assert_eq!(messages[2].role, Role::Tool);
    assert_eq!(messages[2].content, "socks, shoes and dust bunnies");
    assert_eq!(messages[2].name.as_deref(), Some("get_items"));
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));

    assert_eq!(messages[3].role, Role::Assistant);
    assert_eq!(
        messages[3].content,
        "In the bedroom, you have socks, shoes, and dust bunnies."
    );
    assert!(!messages[3].has_tool_calls());

    // Second model call saw the tool result; both saw the same schema.
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[0].tools, requests[1].tools);
    assert_eq!(requests[0].tools[0].name, "get_items");
}

#[tokio::test]
async fn stream_orders_fragments_before_updates() {
    let model = Arc::new(ScriptedModel::new());
    queue_bedroom_script(&model);
    let graph = Arc::new(agent_graph(model));

    let events: Vec<RunEvent> = graph
        .stream(bedroom_question())
        .map(|item| item.unwrap())
        .collect()
        .await;

    // Collapse consecutive fragments into one marker per node turn.
    let mut shape: Vec<String> = Vec::new();
    for event in &events {
        let label = match event {
            RunEvent::Fragment { node, .. } => format!("fragments:{node}"),
            RunEvent::Update { node, .. } => format!("update:{node}"),
            RunEvent::Finished { .. } => "finished".to_string(),
        };
        if shape.last() != Some(&label) {
            shape.push(label);
        }
    }
    assert_eq!(
        shape,
        vec![
            format!("fragments:{AGENT_NODE}"),
            format!("update:{AGENT_NODE}"),
            format!("update:{TOOLS_NODE}"),
            format!("fragments:{AGENT_NODE}"),
            format!("update:{AGENT_NODE}"),
            "finished".to_string(),
        ]
    );

    // Text fragments concatenate to the final answer.
    let streamed_text: String = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Fragment { fragment, .. } if fragment.kind() == FragmentKind::Text => {
                fragment.text_delta().map(str::to_string)
            }
            _ => None,
        })
        .collect();
    assert_eq!(streamed_text, "In the bedroom, you have socks, shoes, and dust bunnies.");

    match events.last() {
        Some(RunEvent::Finished { state }) => assert_eq!(state.len(), 4),
        other => panic!("expected Finished, got {:?}", other),
    }
}

#[tokio::test]
async fn final_state_matches_invoke() {
    let model = Arc::new(ScriptedModel::new());
    queue_bedroom_script(&model);
    let streamed = Arc::new(agent_graph(model))
        .stream(bedroom_question())
        .final_state()
        .await
        .unwrap();

    let model = Arc::new(ScriptedModel::new());
    queue_bedroom_script(&model);
    let invoked = agent_graph(model).invoke(bedroom_question()).await.unwrap();

    assert_eq!(streamed, invoked);
}

#[tokio::test]
async fn unknown_tool_is_fed_back_and_run_continues() {
    let model = Arc::new(ScriptedModel::new());
    model.queue_tool_call("call_1", "open_wardrobe", &["{}"]);
    model.queue_text(&["I can't open wardrobes, sorry."]);
    let graph = agent_graph(model.clone());

    let state = graph.invoke(bedroom_question()).await.unwrap();
    assert_eq!(state.len(), 4);

    let tool_msg = &state.messages()[2];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.name.as_deref(), Some("open_wardrobe"));
    let payload: Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(payload["error"], "unknown_tool");

    // The model was shown its own mistake.
    assert_eq!(model.requests()[1].messages[2], *tool_msg);
}

#[tokio::test]
async fn unparseable_arguments_are_fed_back() {
    let model = Arc::new(ScriptedModel::new());
    // Slot never closed: arguments stay partial.
    model.queue_tool_call("call_1", "get_items", &["{\"place\":"]);
    model.queue_text(&["Let me try again later."]);
    let graph = agent_graph(model);

    let state = graph.invoke(bedroom_question()).await.unwrap();
    assert_eq!(state.messages()[1].tool_calls[0].arguments, "{\"place\":");

    let payload: Value = serde_json::from_str(&state.messages()[2].content).unwrap();
    assert_eq!(payload["error"], "invalid_arguments");
    assert_eq!(state.last().map(|m| m.role), Some(Role::Assistant));
}

#[tokio::test]
async fn upstream_failure_is_fatal_and_appends_nothing() {
    let model = Arc::new(ScriptedModel::new());
    model.queue_response(vec![
        Ok(steploop_runtime::Fragment::role(Role::Assistant)),
        Ok(steploop_runtime::Fragment::text("In the")),
        Err(LlmError::NetworkError("connection reset by peer".to_string())),
    ]);
    let graph = Arc::new(agent_graph(model));

    let items: Vec<_> = graph.stream(bedroom_question()).collect().await;
    let updates = items
        .iter()
        .filter(|i| matches!(i, Ok(RunEvent::Update { .. })))
        .count();
    assert_eq!(updates, 0);
    assert!(matches!(
        items.last(),
        Some(Err(RunError::UpstreamStream { node, source: LlmError::NetworkError(_) })) if node == AGENT_NODE
    ));
}

#[tokio::test]
async fn roleless_stream_is_malformed() {
    let model = Arc::new(ScriptedModel::new());
    model.queue_fragments(vec![steploop_runtime::Fragment::text("mystery")]);
    let graph = agent_graph(model);

    let err = graph.invoke(bedroom_question()).await.unwrap_err();
    assert!(matches!(err, RunError::MalformedStream { .. }));
}

#[tokio::test]
async fn runaway_tool_loop_hits_recursion_limit() {
    let model = Arc::new(ScriptedModel::new());
    for i in 0..10 {
        model.queue_tool_call(&format!("call_{i}"), "get_items", &[r#"{"place":"shelf"}"#]);
    }
    let mut registry = ToolRegistry::new();
    registry.register(get_items_tool()).unwrap();
    let graph = AgentGraph::builder(model.clone() as Arc<dyn ChatModel>, Arc::new(registry))
        .recursion_limit(5)
        .build()
        .unwrap();

    let err = graph.invoke(bedroom_question()).await.unwrap_err();
    assert!(matches!(err, RunError::RecursionLimit(5)));
    // agent, tools, agent, tools, agent
    assert_eq!(model.requests().len(), 3);
}

#[tokio::test]
async fn history_without_pending_calls_ends_after_one_turn() {
    let model = Arc::new(ScriptedModel::new());
    model.queue_text(&["Hello!"]);
    let graph = agent_graph(model.clone());

    // Earlier tool traffic in history does not matter; only the last message does.
    let initial = ConversationState::from(vec![
        Message::user("hi"),
        Message::assistant_with_tool_calls(
            "",
            vec![steploop_runtime::ToolCall::new("old", "get_items", r#"{"place":"bed"}"#)],
        ),
        Message::tool_result("old", "get_items", "socks"),
        Message::user("thanks"),
    ]);
    let state = graph.invoke(initial).await.unwrap();
    assert_eq!(state.len(), 5);
    assert_eq!(model.requests().len(), 1);
}
