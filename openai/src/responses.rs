//! Responses API service.
//!
//! Streaming responses share the event vocabulary of realtime sessions, so
//! streamed events are decoded with [`ServerEvent`] and reconciled with the
//! same [`Conversation`] model.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use orca_openai_realtime::{
    Conversation, ConversationItem, ItemSnapshot, ResponseStatus, ServerEvent, ToolCall, Update,
    Usage,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    error::{Error, Result},
    http::{HttpClient, SseReader},
};

/// Responses API service.
pub struct ResponseService {
    http: Arc<HttpClient>,
}

impl ResponseService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Creates a response.
    pub async fn create(&self, request: &ResponseRequest) -> Result<ModelResponse> {
        self.http.request(Method::POST, "/responses", Some(request)).await
    }

    pub async fn retrieve(&self, response_id: &str) -> Result<ModelResponse> {
        let path = format!("/responses/{}", response_id);
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    /// Cancels a background response.
    pub async fn cancel(&self, response_id: &str) -> Result<ModelResponse> {
        let path = format!("/responses/{}/cancel", response_id);
        self.http.request::<(), _>(Method::POST, &path, None).await
    }

    /// Creates a streaming response.
    ///
    /// Each item is one decoded event. Events that fail to decode are
    /// yielded as errors and the stream continues; a broken connection ends
    /// it after yielding the error.
    pub async fn create_stream(
        &self,
        request: &ResponseRequest,
    ) -> Result<impl Stream<Item = Result<ServerEvent>> + use<>> {
        let mut request = request.clone();
        request.stream = Some(true);

        let byte_stream = self.http.request_stream("/responses", &request).await?;
        let mut reader = SseReader::new(Box::pin(byte_stream));

        Ok(stream! {
            loop {
                match reader.read_event().await {
                    Ok(Some(data)) => yield ServerEvent::parse(&data).map_err(Error::from),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }

    /// Streams a response to the end and returns the reconciled state.
    ///
    /// Undecodable or unmergeable events are logged and skipped.
    pub async fn create_streamed(&self, request: &ResponseRequest) -> Result<ResponseStreamAccumulator> {
        let mut events = Box::pin(self.create_stream(request).await?);
        let mut acc = ResponseStreamAccumulator::new();
        while let Some(event) = events.next().await {
            match event.and_then(|event| acc.push(&event)) {
                Ok(_) => {}
                Err(Error::Realtime(e)) if e.is_event_local() => {
                    warn!(error = %e, "skipping response stream event");
                    acc.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            status = ?acc.status(),
            anomalies = acc.anomaly_count(),
            skipped = acc.skipped,
            "response stream ended"
        );
        Ok(acc)
    }
}

// ==================== Request/Response Types ====================

/// Request for creating a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseRequest {
    pub model: String,

    /// A string or a list of input items.
    pub input: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,

    /// Reasoning options, e.g. `{"effort": "low", "summary": "auto"}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl ResponseRequest {
    /// A request with plain text input.
    pub fn text(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: Value::String(input.into()),
            ..Default::default()
        }
    }
}

/// A response object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelResponse {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    pub model: String,
    /// "queued", "in_progress", "completed", "cancelled", "incomplete" or "failed".
    pub status: String,
    pub output: Vec<ConversationItem>,
    pub usage: Option<Value>,
    pub error: Option<Value>,
    pub incomplete_details: Option<Value>,
    pub previous_response_id: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl ModelResponse {
    /// Parsed status.
    pub fn response_status(&self) -> ResponseStatus {
        ResponseStatus::from_wire(&self.status).unwrap_or_default()
    }

    /// Concatenated text of all assistant message outputs.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.item_type.as_deref() == Some("message"))
            .flat_map(|item| item.content.iter())
            .filter(|part| part.part_type.as_deref() == Some("output_text"))
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

// ==================== Stream Accumulator ====================

/// Reconciles a streamed response into items.
///
/// Output items, content parts, reasoning summaries, refusals, function
/// arguments and code are merged exactly as realtime events are.
#[derive(Debug, Clone, Default)]
pub struct ResponseStreamAccumulator {
    conversation: Conversation,
    skipped: usize,
}

impl ResponseStreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event.
    pub fn push(&mut self, event: &ServerEvent) -> Result<Update> {
        self.conversation.apply(event).map_err(Error::from)
    }

    pub fn status(&self) -> ResponseStatus {
        self.conversation.response_status()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.conversation.response().and_then(|r| r.id())
    }

    /// Output items in order.
    pub fn items(&self) -> Vec<ItemSnapshot> {
        self.conversation.snapshots()
    }

    /// Concatenated text of all assistant messages.
    pub fn output_text(&self) -> String {
        self.conversation
            .snapshots()
            .iter()
            .filter(|item| item.role.as_deref() == Some("assistant"))
            .map(ItemSnapshot::text)
            .collect()
    }

    /// Function calls whose arguments are complete.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.conversation.pending_tool_calls()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.conversation.usage()
    }

    pub fn anomaly_count(&self) -> usize {
        self.conversation.anomaly_count()
    }

    /// Events dropped because they could not be decoded or merged.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}
