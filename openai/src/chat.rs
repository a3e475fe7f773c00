//! Chat completions service.

use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use orca_delta::{DeltaText, Indexed, Merge, MergeOutcome, merge_at, set_once};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{
    error::{Error, Result},
    http::{HttpClient, SseReader},
};

/// Chat completions service.
pub struct ChatService {
    http: Arc<HttpClient>,
}

impl ChatService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Creates a chat completion.
    pub async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        self.http
            .request(Method::POST, "/chat/completions", Some(request))
            .await
    }

    /// Creates a streaming chat completion.
    ///
    /// Returns a stream of chunks; fold them with a
    /// [`ChatStreamAccumulator`] to rebuild the full completion.
    pub async fn create_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<impl Stream<Item = Result<ChatCompletionChunk>> + use<>> {
        let mut request = request.clone();
        request.stream = Some(true);

        let byte_stream = self.http.request_stream("/chat/completions", &request).await?;
        let mut reader = SseReader::new(Box::pin(byte_stream));

        Ok(try_stream! {
            while let Some(data) = reader.read_event().await? {
                let chunk: ChatCompletionChunk = serde_json::from_str(&data)?;
                yield chunk;
            }
        })
    }

    /// Streams a completion to the end and returns the reconstructed result.
    pub async fn create_streamed(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        use futures::StreamExt;

        let mut stream = Box::pin(self.create_stream(request).await?);
        let mut acc = ChatStreamAccumulator::new();
        while let Some(chunk) = stream.next().await {
            acc.push(&chunk?);
        }
        Ok(acc.finish())
    }
}

// ==================== Request/Response Types ====================

/// Request for a chat completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,

    pub messages: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,

    /// "auto", "none", "required", or a specific function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "developer", "user", "assistant" or "tool".
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// The result of a tool call, correlated by `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role("tool", content)
        }
    }
}

/// Function tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

impl ChatTool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: Some(description.into()),
                parameters: Some(parameters),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    /// Parses the arguments JSON.
    pub fn parsed_arguments(&self) -> Result<Value> {
        if self.function.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.function.arguments).map_err(Error::from)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Response from a chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

impl ChatCompletion {
    /// Content of the first choice.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// ==================== Streaming Types ====================

/// A chunk of a streaming chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: usize,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// A tool call fragment; `index` addresses the call within the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

// ==================== Stream Accumulator ====================

#[derive(Debug, Clone, Default)]
struct ToolCallState {
    index: Option<usize>,
    id: Option<String>,
    call_type: Option<String>,
    name: Option<String>,
    arguments: DeltaText,
}

impl From<&ToolCallDelta> for ToolCallState {
    fn from(delta: &ToolCallDelta) -> Self {
        let function = delta.function.as_ref();
        Self {
            index: Some(delta.index),
            id: delta.id.clone(),
            call_type: delta.call_type.clone(),
            name: function.and_then(|f| f.name.clone()),
            arguments: function
                .and_then(|f| f.arguments.clone())
                .map(DeltaText::from_delta)
                .unwrap_or_default(),
        }
    }
}

impl Indexed for ToolCallState {
    fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Merge for ToolCallState {
    fn merge(&mut self, incoming: Self) {
        set_once(&mut self.id, incoming.id);
        set_once(&mut self.call_type, incoming.call_type);
        set_once(&mut self.name, incoming.name);
        self.arguments.merge(incoming.arguments);
    }
}

#[derive(Debug, Clone, Default)]
struct ChoiceState {
    index: Option<usize>,
    role: Option<String>,
    content: DeltaText,
    refusal: DeltaText,
    tool_calls: Vec<ToolCallState>,
    finish_reason: Option<String>,
}

impl Indexed for ChoiceState {
    fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Merge for ChoiceState {
    fn merge(&mut self, incoming: Self) {
        set_once(&mut self.role, incoming.role);
        self.content.merge(incoming.content);
        self.refusal.merge(incoming.refusal);
        set_once(&mut self.finish_reason, incoming.finish_reason);
    }
}

impl From<&ChunkChoice> for ChoiceState {
    fn from(choice: &ChunkChoice) -> Self {
        let delta = &choice.delta;
        Self {
            index: Some(choice.index),
            role: delta.role.clone(),
            content: delta.content.clone().map(DeltaText::from_delta).unwrap_or_default(),
            refusal: delta.refusal.clone().map(DeltaText::from_delta).unwrap_or_default(),
            // Placed by the accumulator, which tracks index gaps.
            tool_calls: Vec::new(),
            finish_reason: choice.finish_reason.clone(),
        }
    }
}

/// Rebuilds a [`ChatCompletion`] from streamed chunks.
///
/// Choices and their tool calls are addressed by `index`; fragments for the
/// same index are merged, content and arguments concatenate, and identity
/// fields (id, role, tool name) keep their first non-empty value.
#[derive(Debug, Clone, Default)]
pub struct ChatStreamAccumulator {
    id: Option<String>,
    model: Option<String>,
    created: i64,
    choices: Vec<ChoiceState>,
    usage: Option<CompletionUsage>,
    gaps: usize,
}

impl ChatStreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk.
    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        set_once(&mut self.id, Some(chunk.id.clone()));
        set_once(&mut self.model, Some(chunk.model.clone()));
        if self.created == 0 {
            self.created = chunk.created;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }
        for choice in &chunk.choices {
            let outcome = merge_at(&mut self.choices, Some(ChoiceState::from(choice)));
            if let MergeOutcome::Padded { index, gap } = outcome {
                warn!(index, gap, "chat chunk skipped choice indices");
                self.gaps += 1;
            }
            let Some(state) = self.choices.get_mut(choice.index) else {
                continue;
            };
            for call in &choice.delta.tool_calls {
                let outcome = merge_at(&mut state.tool_calls, Some(ToolCallState::from(call)));
                if let MergeOutcome::Padded { index, gap } = outcome {
                    warn!(choice = choice.index, index, gap, "chat chunk skipped tool call indices");
                    self.gaps += 1;
                }
            }
        }
    }

    /// Content accumulated so far for choice `index`.
    pub fn content(&self, index: usize) -> Option<&str> {
        self.choices
            .get(index)
            .and_then(|c| c.content.value())
            .map(String::as_str)
    }

    /// Number of fragments that skipped ahead in the choice or tool call
    /// indices.
    pub fn gap_count(&self) -> usize {
        self.gaps
    }

    /// Returns the reconstructed completion.
    pub fn finish(&self) -> ChatCompletion {
        let choices = self
            .choices
            .iter()
            .enumerate()
            .map(|(index, state)| Choice {
                index,
                message: ChatMessage {
                    role: state.role.clone().unwrap_or_else(|| "assistant".to_string()),
                    content: state.content.to_value(),
                    refusal: state.refusal.to_value(),
                    tool_calls: state
                        .tool_calls
                        .iter()
                        .map(|call| ToolCall {
                            id: call.id.clone().unwrap_or_default(),
                            call_type: call.call_type.clone().unwrap_or_else(|| "function".to_string()),
                            function: FunctionCall {
                                name: call.name.clone().unwrap_or_default(),
                                arguments: call.arguments.to_value().unwrap_or_default(),
                            },
                        })
                        .collect(),
                    ..Default::default()
                },
                finish_reason: state.finish_reason.clone(),
            })
            .collect();

        ChatCompletion {
            id: self.id.clone().unwrap_or_default(),
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model.clone().unwrap_or_default(),
            choices,
            usage: self.usage.clone(),
        }
    }
}
