//! Tests for stream reconstruction, job polling and client setup.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use orca_openai_realtime::{ItemStatus, ResponseStatus, ServerEvent};
use serde_json::{Value, json};

use super::http::SseReader;
use super::types::poll_job;
use super::*;

fn sse(chunks: &[&'static str]) -> SseReader<futures::stream::Iter<std::vec::IntoIter<Result<Bytes>>>> {
    let items: Vec<Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
    SseReader::new(futures::stream::iter(items))
}

fn chunk(value: Value) -> ChatCompletionChunk {
    serde_json::from_value(value).unwrap()
}

// ==================== SSE ====================

#[tokio::test]
async fn test_sse_reader_split_chunks() {
    let mut reader = sse(&["data: {\"a\"", ":1}\n", "\ndata: {\"b\":2}\n\n", "data: [DONE]\n\n"]);
    assert_eq!(reader.read_event().await.unwrap().as_deref(), Some("{\"a\":1}"));
    assert_eq!(reader.read_event().await.unwrap().as_deref(), Some("{\"b\":2}"));
    assert_eq!(reader.read_event().await.unwrap(), None);
    assert_eq!(reader.read_event().await.unwrap(), None);
}

#[tokio::test]
async fn test_sse_reader_crlf_comments_and_tail() {
    let mut reader = sse(&[": ping\r\n\r\n", "event: message\r\ndata: one\r\ndata: two\r\n\r\n", "data: last"]);
    assert_eq!(reader.read_event().await.unwrap().as_deref(), Some("one\ntwo"));
    assert_eq!(reader.read_event().await.unwrap().as_deref(), Some("last"));
    assert_eq!(reader.read_event().await.unwrap(), None);
}

#[test]
fn test_sse_reader_propagates_stream_error() {
    let items: Vec<Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"data: x\n\n")),
        Err(Error::Stream("connection reset".to_string())),
    ];
    let mut reader = SseReader::new(futures::stream::iter(items));
    tokio_test::block_on(async {
        assert_eq!(reader.read_event().await.unwrap().as_deref(), Some("x"));
        assert!(matches!(reader.read_event().await, Err(Error::Stream(_))));
    });
}

// ==================== Chat Stream ====================

#[test]
fn test_chat_stream_concatenates_content() {
    let mut acc = ChatStreamAccumulator::new();
    acc.push(&chunk(json!({
        "id": "chatcmpl-1", "model": "gpt-4o-mini", "created": 100,
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}}]
    })));
    acc.push(&chunk(json!({
        "id": "chatcmpl-1", "model": "gpt-4o-mini", "created": 100,
        "choices": [{"index": 0, "delta": {"content": "lo"}}]
    })));
    acc.push(&chunk(json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
    })));

    assert_eq!(acc.content(0), Some("Hello"));
    let completion = acc.finish();
    assert_eq!(completion.id, "chatcmpl-1");
    assert_eq!(completion.model, "gpt-4o-mini");
    assert_eq!(completion.created, 100);
    assert_eq!(completion.text(), "Hello");
    assert_eq!(completion.choices[0].message.role, "assistant");
    assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(completion.usage.as_ref().map(|u| u.total_tokens), Some(5));
    assert_eq!(acc.gap_count(), 0);
}

#[test]
fn test_chat_stream_merges_tool_calls_by_index() {
    let mut acc = ChatStreamAccumulator::new();
    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [
            {"index": 0, "id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": ""}},
            {"index": 1, "id": "call_b", "type": "function", "function": {"name": "get_time", "arguments": "{}"}}
        ]}}]
    })));
    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "{\"city\":"}}
        ]}}]
    })));
    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_late", "function": {"name": "other", "arguments": "\"Paris\"}"}}
        ]}, "finish_reason": "tool_calls"}]
    })));

    let completion = acc.finish();
    let calls = &completion.choices[0].message.tool_calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_a");
    assert_eq!(calls[0].function.name, "get_weather");
    assert_eq!(calls[0].function.arguments, "{\"city\":\"Paris\"}");
    assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"city": "Paris"}));
    assert_eq!(calls[1].id, "call_b");
    assert_eq!(calls[1].call_type, "function");
    assert_eq!(completion.choices[0].message.content, None);
    assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("tool_calls"));
}

#[test]
fn test_chat_stream_pads_skipped_choice() {
    let mut acc = ChatStreamAccumulator::new();
    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 2, "delta": {"content": "third"}}]
    })));
    assert_eq!(acc.gap_count(), 1);
    assert_eq!(acc.content(2), Some("third"));
    assert_eq!(acc.content(0), None);

    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"content": "first"}}]
    })));
    let completion = acc.finish();
    assert_eq!(completion.choices.len(), 3);
    assert_eq!(completion.text(), "first");
    assert_eq!(completion.choices[1].message.content, None);
}

#[test]
fn test_chat_stream_pads_skipped_tool_call() {
    let mut acc = ChatStreamAccumulator::new();
    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [
            {"index": 1, "id": "call_b", "type": "function", "function": {"name": "get_time", "arguments": "{}"}}
        ]}}]
    })));
    assert_eq!(acc.gap_count(), 1);

    acc.push(&chunk(json!({
        "id": "c",
        "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}}
        ]}}]
    })));
    let completion = acc.finish();
    let calls = &completion.choices[0].message.tool_calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_a");
    assert_eq!(calls[1].id, "call_b");
    assert_eq!(acc.gap_count(), 1);
}

// ==================== Responses ====================

fn response_event(value: Value) -> ServerEvent {
    ServerEvent::from_value(value).unwrap()
}

fn responses_text_stream() -> Vec<Value> {
    vec![
        json!({
            "type": "response.created", "sequence_number": 0,
            "response": {"id": "resp_1", "object": "response", "status": "in_progress", "output": []}
        }),
        json!({
            "type": "response.output_item.added", "sequence_number": 1, "output_index": 0,
            "item": {"id": "msg_1", "type": "message", "role": "assistant", "status": "in_progress", "content": []}
        }),
        json!({
            "type": "response.content_part.added", "sequence_number": 2,
            "item_id": "msg_1", "output_index": 0, "content_index": 0,
            "part": {"type": "output_text", "text": "", "annotations": []}
        }),
        json!({
            "type": "response.output_text.delta", "sequence_number": 3,
            "item_id": "msg_1", "output_index": 0, "content_index": 0, "delta": "Hi"
        }),
        json!({
            "type": "response.output_text.delta", "sequence_number": 4,
            "item_id": "msg_1", "output_index": 0, "content_index": 0, "delta": " there"
        }),
        json!({
            "type": "response.output_text.done", "sequence_number": 5,
            "item_id": "msg_1", "output_index": 0, "content_index": 0, "text": "Hi there"
        }),
        json!({
            "type": "response.output_item.done", "sequence_number": 6, "output_index": 0,
            "item": {
                "id": "msg_1", "type": "message", "role": "assistant", "status": "completed",
                "content": [{"type": "output_text", "text": "Hi there", "annotations": []}]
            }
        }),
        json!({
            "type": "response.completed", "sequence_number": 7,
            "response": {
                "id": "resp_1", "object": "response", "status": "completed",
                "output": [{
                    "id": "msg_1", "type": "message", "role": "assistant", "status": "completed",
                    "content": [{"type": "output_text", "text": "Hi there", "annotations": []}]
                }],
                "usage": {"input_tokens": 4, "output_tokens": 2, "total_tokens": 6}
            }
        }),
    ]
}

#[test]
fn test_response_stream_accumulates_text() {
    let mut acc = ResponseStreamAccumulator::new();
    for value in responses_text_stream() {
        acc.push(&response_event(value)).unwrap();
    }

    assert_eq!(acc.status(), ResponseStatus::Completed);
    assert_eq!(acc.response_id(), Some("resp_1"));
    assert_eq!(acc.output_text(), "Hi there");
    let items = acc.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ItemStatus::Completed);
    assert_eq!(acc.usage().map(|u| u.total_tokens), Some(6));
    assert_eq!(acc.anomaly_count(), 0);
    assert!(acc.tool_calls().is_empty());
}

#[test]
fn test_response_stream_partial_text_before_completion() {
    let mut acc = ResponseStreamAccumulator::new();
    for value in responses_text_stream().into_iter().take(4) {
        acc.push(&response_event(value)).unwrap();
    }
    assert_eq!(acc.status(), ResponseStatus::InProgress);
    assert_eq!(acc.output_text(), "Hi");
}

#[test]
fn test_model_response_output_text() {
    let response: ModelResponse = serde_json::from_value(json!({
        "id": "resp_2", "object": "response", "created_at": 1700000000,
        "model": "gpt-4.1", "status": "completed",
        "output": [
            {"id": "rs_1", "type": "reasoning", "summary": []},
            {
                "id": "msg_1", "type": "message", "role": "assistant", "status": "completed",
                "content": [
                    {"type": "output_text", "text": "Paris", "annotations": []},
                    {"type": "output_text", "text": " is the capital.", "annotations": []}
                ]
            }
        ],
        "usage": {"input_tokens": 10, "output_tokens": 5, "total_tokens": 15}
    }))
    .unwrap();
    assert_eq!(response.response_status(), ResponseStatus::Completed);
    assert_eq!(response.output_text(), "Paris is the capital.");
}

#[test]
fn test_response_request_serialization() {
    let mut request = ResponseRequest::text("gpt-4.1", "hello");
    request.previous_response_id = Some("resp_0".to_string());
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({"model": "gpt-4.1", "input": "hello", "previous_response_id": "resp_0"})
    );
}

// ==================== Jobs ====================

fn batch(status: &str) -> Batch {
    serde_json::from_value(json!({
        "id": "batch_1", "object": "batch", "endpoint": "/v1/chat/completions",
        "input_file_id": "file_1", "completion_window": "24h", "status": status,
        "created_at": 1
    }))
    .unwrap()
}

#[test]
fn test_job_status_wire_names() {
    assert_eq!(batch("validating").status, JobStatus::NotStarted);
    assert_eq!(batch("finalizing").status, JobStatus::InProgress);
    assert_eq!(batch("cancelling").status, JobStatus::Cancelling);
    assert!(batch("cancelling").status.cancel_requested());
    assert!(!batch("in_progress").status.cancel_requested());
    assert!(batch("expired").status.is_terminal());
    assert!(!batch("cancelling").status.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn test_poll_job_until_terminal() {
    let mut states = VecDeque::from(vec![batch("validating"), batch("in_progress"), batch("completed")]);
    let mut fetches = 0;
    let result = poll_job(Duration::from_secs(60), Duration::from_secs(1), || {
        fetches += 1;
        let next = states.pop_front().unwrap();
        async move { Ok(next) }
    })
    .await
    .unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(fetches, 3);
}

#[tokio::test(start_paused = true)]
async fn test_poll_job_returns_last_state_at_timeout() {
    let result = poll_job(Duration::from_secs(5), Duration::from_secs(2), || async {
        Ok(batch("in_progress"))
    })
    .await
    .unwrap();
    assert_eq!(result.status, JobStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_poll_job_reports_failure() {
    let mut failed = batch("failed");
    failed.errors = Some(BatchErrors {
        object: "list".to_string(),
        data: vec![BatchError {
            code: "invalid_json_line".to_string(),
            message: "line 3 is not valid JSON".to_string(),
            ..Default::default()
        }],
    });
    let err = poll_job(Duration::from_secs(5), Duration::from_secs(1), || {
        let failed = failed.clone();
        async move { Ok(failed) }
    })
    .await
    .unwrap_err();
    match err {
        Error::JobFailed(message) => assert_eq!(message, "batch_1: line 3 is not valid JSON"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_file_batch_failure_reason() {
    let file_batch: FileBatch = serde_json::from_value(json!({
        "id": "vsfb_1", "vector_store_id": "vs_1", "status": "failed",
        "file_counts": {"in_progress": 0, "completed": 1, "failed": 2, "cancelled": 0, "total": 3}
    }))
    .unwrap();
    assert_eq!(file_batch.failure().as_deref(), Some("2 of 3 files failed"));
}

#[test]
fn test_list_params_query() {
    assert_eq!(ListParams::default().to_query(), "");
    let params = ListParams {
        limit: Some(10),
        after: Some("batch_9".to_string()),
        ..Default::default()
    };
    assert_eq!(params.to_query(), "?limit=10&after=batch_9");
}

// ==================== Client ====================

#[test]
fn test_error_predicates() {
    let err = Error::api(401, "Incorrect API key provided");
    assert!(err.is_invalid_api_key());
    assert!(!err.is_retryable());
    assert!(Error::api(500, "oops").is_retryable());
    assert!(!Error::Config("x".to_string()).is_retryable());
}

#[test]
fn test_client_builder_rejects_empty_key() {
    assert!(matches!(Client::new("  "), Err(Error::Config(_))));
}

#[test]
fn test_client_builder_settings() {
    let client = Client::builder("sk-test")
        .base_url("http://localhost:8080/v1")
        .max_retries(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080/v1");
    assert_eq!(client.max_retries(), 0);
    assert_eq!(client.timeout(), Duration::from_secs(5));
}
