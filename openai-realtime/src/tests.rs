//! Tests for event reconciliation and the exchange coordinator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::*;

// ============================================================================
// Fixtures
// ============================================================================

fn event(value: Value) -> ServerEvent {
    ServerEvent::from_value(value).unwrap()
}

fn apply(conversation: &mut Conversation, value: Value) -> Update {
    conversation.apply(&event(value)).unwrap()
}

fn assistant_item(id: &str, status: &str) -> Value {
    json!({"id": id, "type": "message", "role": "assistant", "status": status, "content": []})
}

fn text_delta(item_id: &str, delta: &str) -> Value {
    json!({
        "type": "response.text.delta",
        "response_id": "resp_1",
        "item_id": item_id,
        "output_index": 0,
        "content_index": 0,
        "delta": delta
    })
}

fn text_done(item_id: &str, text: &str) -> Value {
    json!({
        "type": "response.text.done",
        "response_id": "resp_1",
        "item_id": item_id,
        "output_index": 0,
        "content_index": 0,
        "text": text
    })
}

/// A complete text response for `item_id`.
fn text_response(response_id: &str, item_id: &str, deltas: &[&str]) -> Vec<Value> {
    let text: String = deltas.concat();
    let mut events = vec![
        json!({"type": "response.created", "response": {"id": response_id, "status": "in_progress"}}),
        json!({
            "type": "response.output_item.added",
            "response_id": response_id,
            "output_index": 0,
            "item": assistant_item(item_id, "in_progress")
        }),
        json!({
            "type": "response.content_part.added",
            "response_id": response_id,
            "item_id": item_id,
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "text", "text": ""}
        }),
    ];
    events.extend(deltas.iter().map(|d| text_delta(item_id, d)));
    events.push(text_done(item_id, &text));
    events.push(json!({
        "type": "response.output_item.done",
        "response_id": response_id,
        "output_index": 0,
        "item": {
            "id": item_id, "type": "message", "role": "assistant", "status": "completed",
            "content": [{"type": "text", "text": text}]
        }
    }));
    events.push(json!({
        "type": "response.done",
        "response": {
            "id": response_id,
            "status": "completed",
            "usage": {"total_tokens": 12, "input_tokens": 5, "output_tokens": 7}
        }
    }));
    events
}

/// A response whose only output is a `get_weather` function call.
fn function_call_response(response_id: &str, item_id: &str, call_id: &str) -> Vec<Value> {
    vec![
        json!({"type": "response.created", "response": {"id": response_id, "status": "in_progress"}}),
        json!({
            "type": "response.output_item.added",
            "response_id": response_id,
            "output_index": 0,
            "item": {
                "id": item_id, "type": "function_call", "status": "in_progress",
                "call_id": call_id, "name": "get_weather", "arguments": ""
            }
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "response_id": response_id, "item_id": item_id, "output_index": 0,
            "call_id": call_id, "delta": "{\"x\":"
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "response_id": response_id, "item_id": item_id, "output_index": 0,
            "call_id": call_id, "delta": "1}"
        }),
        json!({
            "type": "response.function_call_arguments.done",
            "response_id": response_id, "item_id": item_id, "output_index": 0,
            "call_id": call_id, "arguments": "{\"x\":1}"
        }),
        json!({
            "type": "response.output_item.done",
            "response_id": response_id,
            "output_index": 0,
            "item": {
                "id": item_id, "type": "function_call", "status": "completed",
                "call_id": call_id, "name": "get_weather", "arguments": "{\"x\":1}"
            }
        }),
        json!({"type": "response.done", "response": {"id": response_id, "status": "completed"}}),
    ]
}

#[derive(Default)]
struct Recorder {
    tags: Mutex<Vec<String>>,
    calls: Mutex<Vec<ToolCall>>,
    errors: Mutex<Vec<String>>,
}

impl Observer for Recorder {
    fn on_event(&self, event: &ServerEvent, _item: Option<&ItemSnapshot>) {
        self.tags.lock().unwrap().push(event.tag().to_string());
    }

    fn on_tool_call(&self, call: &ToolCall) {
        self.calls.lock().unwrap().push(call.clone());
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

// ============================================================================
// Conversation
// ============================================================================

#[test]
fn test_delta_concatenation() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "in_progress")}));

    let fragments = ["The ", "quick ", "", "brown ", "fox"];
    for fragment in fragments {
        apply(&mut conversation, text_delta("a", fragment));
    }

    let snapshot = conversation.snapshot("a").unwrap();
    assert_eq!(snapshot.content[0].text.as_deref(), Some("The quick brown fox"));
}

#[test]
fn test_done_replaces_accumulation() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "in_progress")}));
    apply(&mut conversation, text_delta("a", "Hel"));
    apply(&mut conversation, text_delta("a", "lo"));
    apply(&mut conversation, text_done("a", "Hello world"));

    let snapshot = conversation.snapshot("a").unwrap();
    assert_eq!(snapshot.content[0].text.as_deref(), Some("Hello world"));
}

#[test]
fn test_content_parts_insert_then_merge() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "in_progress")}));
    for index in 0..3 {
        apply(&mut conversation, json!({
            "type": "response.content_part.added",
            "item_id": "a",
            "content_index": index,
            "part": {"type": "text", "text": ""}
        }));
    }
    assert_eq!(conversation.item("a").unwrap().content().len(), 3);

    apply(&mut conversation, text_done("a", "first"));
    let item = conversation.item("a").unwrap();
    assert_eq!(item.content().len(), 3);
    assert_eq!(item.content()[0].text(), Some("first"));
}

#[test]
fn test_identity_fields_are_write_once() {
    let mut conversation = Conversation::new();
    let item = |name: &str| {
        json!({
            "type": "response.output_item.added",
            "response_id": "resp_1",
            "output_index": 0,
            "item": {
                "id": "fc", "type": "function_call", "status": "in_progress",
                "call_id": "call_1", "name": name
            }
        })
    };

    apply(&mut conversation, item("foo"));
    assert_eq!(conversation.item("fc").unwrap().name(), Some("foo"));

    let update = apply(&mut conversation, item("bar"));
    assert!(!update.changed);
    assert_eq!(conversation.item("fc").unwrap().name(), Some("foo"));
}

#[test]
fn test_repeated_terminal_event_is_idempotent() {
    let mut conversation = Conversation::new();
    let done = json!({
        "type": "response.output_item.done",
        "response_id": "resp_1",
        "output_index": 0,
        "item": {
            "id": "a", "type": "message", "role": "assistant", "status": "completed",
            "content": [{"type": "text", "text": "Hi"}]
        }
    });
    apply(&mut conversation, json!({
        "type": "response.output_item.added",
        "response_id": "resp_1",
        "output_index": 0,
        "item": assistant_item("a", "in_progress")
    }));

    let first = apply(&mut conversation, done.clone());
    let after_first = conversation.snapshot("a").unwrap();
    let second = apply(&mut conversation, done);

    assert!(first.changed);
    assert!(!second.changed);
    assert!(second.anomalies.is_empty());
    assert_eq!(conversation.snapshot("a").unwrap(), after_first);
    assert_eq!(after_first.status, ItemStatus::Completed);
}

#[test]
fn test_unknown_tag_is_reported_with_payload() {
    let err = ServerEvent::from_value(json!({"type": "totally.unknown.kind", "x": 1})).unwrap_err();
    match err {
        Error::UnrecognizedEventKind { kind, payload } => {
            assert_eq!(kind, "totally.unknown.kind");
            assert_eq!(payload.unwrap()["x"], 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_text_scenario_snapshot() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({
        "type": "conversation.item.created",
        "item": {"id": "a", "type": "message", "role": "assistant", "content": []}
    }));
    apply(&mut conversation, json!({
        "type": "response.content_part.added",
        "item_id": "a",
        "output_index": 0,
        "content_index": 0,
        "part": {"type": "text"}
    }));
    apply(&mut conversation, text_delta("a", "Hi"));
    apply(&mut conversation, text_delta("a", " there"));
    apply(&mut conversation, text_done("a", "Hi there"));

    let snapshot = serde_json::to_value(conversation.snapshot("a").unwrap()).unwrap();
    assert_eq!(snapshot["role"], "assistant");
    assert_eq!(snapshot["content"], json!([{"type": "text", "text": "Hi there"}]));
    assert_eq!(conversation.anomaly_count(), 0);
}

#[test]
fn test_function_call_arguments_round_trip() {
    let mut conversation = Conversation::new();
    let mut ready = Vec::new();
    for value in function_call_response("resp_1", "fc_1", "call_1") {
        ready.extend(apply(&mut conversation, value).tool_calls);
    }

    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].call_id, "call_1");
    assert_eq!(ready[0].name, "get_weather");
    assert_eq!(ready[0].parsed_arguments().unwrap(), json!({"x": 1}));
    assert_eq!(conversation.pending_tool_calls().len(), 1);

    let resolved = conversation.resolve_tool_call("call_1").unwrap();
    assert_eq!(resolved, ready[0]);
    assert!(conversation.pending_tool_calls().is_empty());
    assert!(matches!(
        conversation.resolve_tool_call("call_1"),
        Err(Error::UnknownToolCall(_))
    ));
}

#[test]
fn test_completed_response_reports_usage() {
    let mut conversation = Conversation::new();
    let mut terminal = None;
    for value in text_response("resp_1", "item_1", &["Hel", "lo"]) {
        if let Some(status) = apply(&mut conversation, value).terminal {
            terminal = Some(status);
        }
    }

    assert_eq!(terminal, Some(ResponseStatus::Completed));
    assert_eq!(conversation.response_status(), ResponseStatus::Completed);
    assert_eq!(conversation.response().unwrap().id(), Some("resp_1"));
    assert_eq!(conversation.usage().unwrap().total_tokens, 12);
    assert_eq!(conversation.snapshot("item_1").unwrap().text(), "Hello");
    assert_eq!(conversation.anomaly_count(), 0);
}

#[test]
fn test_delta_for_unknown_item_creates_placeholder() {
    let mut conversation = Conversation::new();
    let update = apply(&mut conversation, text_delta("ghost", "boo"));

    assert!(matches!(
        update.anomalies.first(),
        Some(Anomaly::UnknownItem { item_id, .. }) if item_id == "ghost"
    ));
    assert_eq!(conversation.snapshot("ghost").unwrap().text(), "boo");
    assert!(conversation.anomaly_count() >= 1);
}

#[test]
fn test_forward_index_pads_with_placeholders() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "in_progress")}));
    let update = apply(&mut conversation, json!({
        "type": "response.content_part.added",
        "item_id": "a",
        "content_index": 2,
        "part": {"type": "text", "text": ""}
    }));

    assert!(update
        .anomalies
        .iter()
        .any(|a| matches!(a, Anomaly::IndexGap { index: 2, gap: 2, .. })));
    assert_eq!(conversation.item("a").unwrap().content().len(), 3);
}

#[test]
fn test_post_terminal_delta_is_appended_and_reported() {
    let mut conversation = Conversation::new();
    for value in text_response("resp_1", "item_1", &["Hi"]) {
        apply(&mut conversation, value);
    }
    let update = apply(&mut conversation, text_delta("item_1", "!"));

    assert!(matches!(
        update.anomalies.as_slice(),
        [Anomaly::PostTerminalDelta { .. }]
    ));
    let snapshot = conversation.snapshot("item_1").unwrap();
    assert_eq!(snapshot.status, ItemStatus::Completed);
    assert_eq!(snapshot.text(), "Hi!");
}

#[test]
fn test_conflicting_done_is_reported() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "in_progress")}));
    apply(&mut conversation, text_done("a", "Hello"));
    let update = apply(&mut conversation, text_done("a", "Goodbye"));

    assert!(matches!(
        update.anomalies.as_slice(),
        [Anomaly::ConflictingTerminal { .. }]
    ));
    assert_eq!(conversation.snapshot("a").unwrap().text(), "Goodbye");
}

#[test]
fn test_previous_item_id_inserts_after() {
    let mut conversation = Conversation::new();
    let created = |id: &str, previous: Option<&str>| {
        json!({
            "type": "conversation.item.created",
            "previous_item_id": previous,
            "item": {
                "id": id, "type": "message", "role": "user",
                "content": [{"type": "input_text", "text": id}]
            }
        })
    };
    apply(&mut conversation, created("a", None));
    apply(&mut conversation, created("b", Some("a")));
    apply(&mut conversation, created("c", Some("a")));
    let update = apply(&mut conversation, created("d", Some("missing")));

    let ids: Vec<_> = conversation.items().iter().filter_map(Item::id).collect();
    assert_eq!(ids, vec!["a", "c", "b", "d"]);
    assert!(matches!(
        update.anomalies.as_slice(),
        [Anomaly::UnknownPreviousItem { .. }]
    ));
}

#[test]
fn test_deleted_item_is_removed() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "conversation.item.created", "item": assistant_item("a", "completed")}));
    let update = apply(&mut conversation, json!({"type": "conversation.item.deleted", "item_id": "a"}));

    assert!(update.changed);
    assert!(conversation.items().is_empty());
}

#[test]
fn test_invalid_item_shape_leaves_conversation_untouched() {
    let mut conversation = Conversation::new();
    let missing_role = event(json!({
        "type": "conversation.item.created",
        "item": {"id": "a", "type": "message", "content": []}
    }));
    assert!(matches!(
        conversation.apply(&missing_role),
        Err(Error::InvalidItemShape(_))
    ));

    let audio_from_system = event(json!({
        "type": "conversation.item.created",
        "item": {
            "id": "b", "type": "message", "role": "system",
            "content": [{"type": "input_audio", "audio": ""}]
        }
    }));
    assert!(matches!(
        conversation.apply(&audio_from_system),
        Err(Error::InvalidItemShape(_))
    ));
    assert!(conversation.items().is_empty());
}

/// Two function calls announced but finished only by `response.done`.
fn parallel_calls_response() -> Vec<Value> {
    let call = |id: &str, call_id: &str, arguments: &str, status: &str| {
        json!({
            "id": id, "type": "function_call", "status": status,
            "call_id": call_id, "name": "get_weather", "arguments": arguments
        })
    };
    vec![
        json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}}),
        json!({
            "type": "response.output_item.added", "response_id": "resp_1", "output_index": 0,
            "item": call("fc_1", "call_1", "", "in_progress")
        }),
        json!({
            "type": "response.output_item.added", "response_id": "resp_1", "output_index": 1,
            "item": call("fc_2", "call_2", "", "in_progress")
        }),
        json!({
            "type": "response.done",
            "response": {
                "id": "resp_1", "status": "completed",
                "output": [
                    call("fc_1", "call_1", "{\"city\":\"Paris\"}", "completed"),
                    call("fc_2", "call_2", "{\"city\":\"Rome\"}", "completed")
                ]
            }
        }),
    ]
}

#[test]
fn test_response_done_surfaces_every_ready_call() {
    let mut conversation = Conversation::new();
    let mut updates: Vec<Update> = parallel_calls_response()
        .into_iter()
        .map(|value| apply(&mut conversation, value))
        .collect();

    let done = updates.pop().unwrap();
    assert!(updates.iter().all(|u| u.tool_calls.is_empty()));
    let ids: Vec<&str> = done.tool_calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, ["call_1", "call_2"]);
    assert_eq!(conversation.pending_tool_calls(), done.tool_calls.as_slice());
}

#[test]
fn test_failed_placeholder_apply_keeps_anomaly_only() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}}));

    let bad_audio = event(json!({
        "type": "response.content_part.added",
        "response_id": "resp_1",
        "item_id": "ghost",
        "output_index": 0,
        "content_index": 0,
        "part": {"type": "audio", "audio": "%%%not base64%%%", "transcript": ""}
    }));
    assert!(conversation.apply(&bad_audio).is_err());

    assert!(conversation.items().is_empty());
    assert!(conversation.response().unwrap().output_item_ids().is_empty());
    assert!(matches!(
        conversation.anomalies(),
        [Anomaly::UnknownItem { item_id, .. }] if item_id == "ghost"
    ));
}

#[test]
fn test_invalid_output_item_is_not_placed() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}}));

    let missing_role = event(json!({
        "type": "response.output_item.added",
        "response_id": "resp_1",
        "output_index": 0,
        "item": {"id": "m", "type": "message", "content": []}
    }));
    assert!(matches!(
        conversation.apply(&missing_role),
        Err(Error::InvalidItemShape(_))
    ));
    assert!(conversation.items().is_empty());
    assert!(conversation.response().unwrap().output_item_ids().is_empty());
}

#[test]
fn test_server_error_is_recorded() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({
        "type": "error",
        "event_id": "evt_1",
        "error": {"type": "invalid_request_error", "code": "bad_item", "message": "nope"}
    }));

    let error = conversation.last_error().unwrap();
    assert_eq!(error.message, "nope");
    assert_eq!(error.code.as_deref(), Some("bad_item"));
}

#[test]
fn test_cancelled_response_marks_items_incomplete() {
    let mut conversation = Conversation::new();
    let events = text_response("resp_1", "item_1", &["Hal"]);
    for value in events.iter().take(4) {
        apply(&mut conversation, value.clone());
    }
    let update = apply(&mut conversation, json!({
        "type": "response.done",
        "response": {
            "id": "resp_1",
            "status": "cancelled",
            "status_details": {"type": "cancelled", "reason": "turn_detected"}
        }
    }));

    assert_eq!(update.terminal, Some(ResponseStatus::Cancelled));
    let snapshot = conversation.snapshot("item_1").unwrap();
    assert_eq!(snapshot.status, ItemStatus::Incomplete);
    assert_eq!(snapshot.text(), "Hal");
    assert_eq!(
        conversation.response().unwrap().status_details().unwrap().reason,
        "turn_detected"
    );
}

#[test]
fn test_input_transcription_accumulates() {
    let mut conversation = Conversation::new();
    apply(&mut conversation, json!({
        "type": "conversation.item.created",
        "item": {
            "id": "u1", "type": "message", "role": "user",
            "content": [{"type": "input_audio", "transcript": null}]
        }
    }));
    apply(&mut conversation, json!({
        "type": "conversation.item.input_audio_transcription.delta",
        "item_id": "u1", "content_index": 0, "delta": "what's the "
    }));
    apply(&mut conversation, json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "u1", "content_index": 0, "transcript": "What's the weather?"
    }));

    let snapshot = conversation.snapshot("u1").unwrap();
    assert_eq!(snapshot.content[0].transcript.as_deref(), Some("What's the weather?"));
}

// ============================================================================
// Exchange
// ============================================================================

#[tokio::test]
async fn test_exchange_text_response() {
    let (session, mut peer) = channel(64);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());
    let cancel = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = peer.recv().await.unwrap().unwrap();
        assert_eq!(request.tag(), "response.create");
        peer.send_all(text_response("resp_1", "item_1", &["Hi", " there"]))
            .await
            .unwrap();
        peer
    });

    exchange
        .start(ClientEvent::create_response(None), &cancel)
        .await
        .unwrap();
    let status = exchange
        .wait_for_terminal(Duration::from_secs(5), &cancel)
        .await
        .unwrap();
    let _peer = server.await.unwrap();

    assert_eq!(status, ResponseStatus::Completed);
    assert_eq!(exchange.item("item_1").await.unwrap().text(), "Hi there");
    assert_eq!(recorder.tags.lock().unwrap().len(), 8);
    assert!(recorder.errors.lock().unwrap().is_empty());
    exchange.close().await.unwrap();
}

#[tokio::test]
async fn test_exchange_tool_call_round_trip() {
    let (session, mut peer) = channel(64);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());
    let cancel = CancellationToken::new();

    exchange.session().create_response(None).await.unwrap();
    peer.recv().await.unwrap().unwrap();
    peer.send_all(function_call_response("resp_1", "fc_1", "call_1"))
        .await
        .unwrap();
    exchange
        .wait_for_terminal(Duration::from_secs(5), &cancel)
        .await
        .unwrap();

    let calls = recorder.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"x": 1}));

    exchange
        .submit_tool_output("call_1", Ok(r#"{"temp":20}"#.to_string()), true)
        .await
        .unwrap();

    match peer.recv().await.unwrap().unwrap() {
        ClientEvent::ConversationItemCreate { item, .. } => {
            assert_eq!(item.item_type.as_deref(), Some("function_call_output"));
            assert_eq!(item.call_id.as_deref(), Some("call_1"));
            assert_eq!(item.output.as_deref(), Some(r#"{"temp":20}"#));
        }
        other => panic!("unexpected request: {other:?}"),
    }
    assert_eq!(peer.recv().await.unwrap().unwrap().tag(), "response.create");
    assert!(exchange.pending_tool_calls().await.is_empty());
    assert_eq!(exchange.status(), ResponseStatus::NotStarted);

    let err = exchange
        .submit_tool_output("call_1", Ok(String::new()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownToolCall(id) if id == "call_1"));
}

#[tokio::test]
async fn test_exchange_wraps_tool_failure() {
    let (session, mut peer) = channel(64);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());
    let cancel = CancellationToken::new();

    peer.send_all(function_call_response("resp_1", "fc_1", "call_1"))
        .await
        .unwrap();
    exchange
        .wait_for_terminal(Duration::from_secs(5), &cancel)
        .await
        .unwrap();

    exchange
        .submit_tool_output("call_1", Err(ToolInvocationError::new("boom")), false)
        .await
        .unwrap();

    match peer.recv().await.unwrap().unwrap() {
        ClientEvent::ConversationItemCreate { item, .. } => {
            let output: Value = serde_json::from_str(item.output.as_deref().unwrap()).unwrap();
            assert_eq!(output, json!({"error": "boom"}));
        }
        other => panic!("unexpected request: {other:?}"),
    }
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_exchange_skips_bad_events() {
    let (session, peer) = channel(64);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());
    let cancel = CancellationToken::new();

    let mut events = vec![json!({"type": "totally.unknown.kind"})];
    events.extend(text_response("resp_1", "item_1", &["ok"]));
    peer.send_all(events).await.unwrap();

    let status = exchange
        .wait_for_terminal(Duration::from_secs(5), &cancel)
        .await
        .unwrap();

    assert_eq!(status, ResponseStatus::Completed);
    assert_eq!(exchange.item("item_1").await.unwrap().text(), "ok");
    let errors = recorder.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("totally.unknown.kind"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_terminal_times_out_with_last_status() {
    let (session, peer) = channel(8);
    let exchange = Exchange::spawn(Arc::new(session), Arc::new(NoopObserver));
    let cancel = CancellationToken::new();

    peer.send(json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}}))
        .await
        .unwrap();

    let status = exchange
        .wait_for_terminal(Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    assert_eq!(status, ResponseStatus::InProgress);
    drop(peer);
}

#[tokio::test]
async fn test_wait_for_terminal_honours_cancellation() {
    let (session, _peer) = channel(8);
    let exchange = Exchange::spawn(Arc::new(session), Arc::new(NoopObserver));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = exchange
        .wait_for_terminal(Duration::from_secs(30), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_closed_transport_propagates() {
    let (session, peer) = channel(8);
    let exchange = Exchange::spawn(Arc::new(session), Arc::new(NoopObserver));
    let cancel = CancellationToken::new();

    peer.hang_up();
    let err = exchange
        .wait_for_terminal(Duration::from_secs(30), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionClosed));
    assert!(exchange.is_closed());
}

#[tokio::test]
async fn test_replayed_events_reach_observer() {
    let (session, _peer) = channel(8);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());

    exchange.on_event(event(text_delta("ghost", "hi"))).await;

    assert_eq!(recorder.tags.lock().unwrap().as_slice(), ["response.text.delta"]);
    // Unknown item, then unknown part.
    assert_eq!(exchange.anomaly_count().await, 2);
    let text = exchange.inspect(|c| c.snapshot("ghost").map(|s| s.text())).await;
    assert_eq!(text.as_deref(), Some("hi"));
}

#[tokio::test]
async fn test_exchange_reports_every_ready_call() {
    let (session, peer) = channel(64);
    let recorder = Arc::new(Recorder::default());
    let exchange = Exchange::spawn(Arc::new(session), recorder.clone());
    let cancel = CancellationToken::new();

    peer.send_all(parallel_calls_response()).await.unwrap();
    let status = exchange
        .wait_for_terminal(Duration::from_secs(5), &cancel)
        .await
        .unwrap();
    assert_eq!(status, ResponseStatus::Completed);

    let calls = recorder.calls.lock().unwrap().clone();
    let ids: Vec<&str> = calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, ["call_1", "call_2"]);
    assert_eq!(exchange.pending_tool_calls().await.len(), 2);
}

/// Holds the pump inside `on_event` for `response.done` until released.
struct HoldOnDone {
    reached: tokio::sync::mpsc::UnboundedSender<()>,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl Observer for HoldOnDone {
    fn on_event(&self, event: &ServerEvent, _item: Option<&ItemSnapshot>) {
        if event.tag() == "response.done" {
            let _ = self.reached.send(());
            let _ = self.release.lock().unwrap().recv();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_response_status_not_overwritten_by_previous_done() {
    let (session, mut peer) = channel(64);
    let (reached_tx, mut reached_rx) = tokio::sync::mpsc::unbounded_channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel();
    let observer = Arc::new(HoldOnDone {
        reached: reached_tx,
        release: Mutex::new(release_rx),
    });
    let exchange = Exchange::spawn(Arc::new(session), observer);
    let cancel = CancellationToken::new();

    peer.send_all(text_response("resp_1", "a", &["done"])).await.unwrap();
    reached_rx.recv().await.unwrap();

    // The previous response's done is merged but not yet published.
    let (started, _) = tokio::join!(
        exchange.start(ClientEvent::create_response(None), &cancel),
        async {
            tokio::task::yield_now().await;
            release_tx.send(()).unwrap();
        }
    );
    started.unwrap();

    assert_eq!(peer.recv().await.unwrap().unwrap().tag(), "response.create");
    assert_eq!(exchange.status(), ResponseStatus::NotStarted);
}
