//! Server events and the tag discriminator.
//!
//! Every inbound message is a JSON object tagged by `type`. [`classify`] maps
//! the tag to an [`EventKind`] through an ordered table of exact and prefix
//! patterns; [`ServerEvent::from_value`] then decodes the payload into the
//! typed variant for that kind.

use base64::Engine;
use orca_delta::{Route, Router, action};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Error, Result};
use crate::types::*;

// ============================================================================
// Server event tags
// ============================================================================

pub const EVENT_TYPE_ERROR: &str = "error";

pub const EVENT_TYPE_SESSION_CREATED: &str = "session.created";
pub const EVENT_TYPE_SESSION_UPDATED: &str = "session.updated";

pub const EVENT_TYPE_CONVERSATION_CREATED: &str = "conversation.created";
pub const EVENT_TYPE_CONVERSATION_ITEM_CREATED: &str = "conversation.item.created";
pub const EVENT_TYPE_CONVERSATION_ITEM_ADDED: &str = "conversation.item.added";
pub const EVENT_TYPE_CONVERSATION_ITEM_DONE: &str = "conversation.item.done";
pub const EVENT_TYPE_CONVERSATION_ITEM_RETRIEVED: &str = "conversation.item.retrieved";
pub const EVENT_TYPE_CONVERSATION_ITEM_TRUNCATED: &str = "conversation.item.truncated";
pub const EVENT_TYPE_CONVERSATION_ITEM_DELETED: &str = "conversation.item.deleted";
pub const EVENT_TYPE_INPUT_AUDIO_TRANSCRIPTION_DELTA: &str =
    "conversation.item.input_audio_transcription.delta";
pub const EVENT_TYPE_INPUT_AUDIO_TRANSCRIPTION_COMPLETED: &str =
    "conversation.item.input_audio_transcription.completed";
pub const EVENT_TYPE_INPUT_AUDIO_TRANSCRIPTION_FAILED: &str =
    "conversation.item.input_audio_transcription.failed";

pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_COMMITTED: &str = "input_audio_buffer.committed";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_CLEARED: &str = "input_audio_buffer.cleared";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_SPEECH_STOPPED: &str = "input_audio_buffer.speech_stopped";

pub const EVENT_TYPE_RESPONSE_CREATED: &str = "response.created";
pub const EVENT_TYPE_RESPONSE_DONE: &str = "response.done";
pub const EVENT_TYPE_RESPONSE_OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
pub const EVENT_TYPE_RESPONSE_OUTPUT_ITEM_DONE: &str = "response.output_item.done";
pub const EVENT_TYPE_RESPONSE_CONTENT_PART_ADDED: &str = "response.content_part.added";
pub const EVENT_TYPE_RESPONSE_CONTENT_PART_DONE: &str = "response.content_part.done";
pub const EVENT_TYPE_RESPONSE_TEXT_DELTA: &str = "response.text.delta";
pub const EVENT_TYPE_RESPONSE_TEXT_DONE: &str = "response.text.done";
pub const EVENT_TYPE_RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
pub const EVENT_TYPE_RESPONSE_AUDIO_DONE: &str = "response.audio.done";
pub const EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DONE: &str = "response.audio_transcript.done";
pub const EVENT_TYPE_RESPONSE_FUNCTION_CALL_ARGUMENTS_DELTA: &str =
    "response.function_call_arguments.delta";
pub const EVENT_TYPE_RESPONSE_FUNCTION_CALL_ARGUMENTS_DONE: &str =
    "response.function_call_arguments.done";

pub const EVENT_TYPE_RATE_LIMITS_UPDATED: &str = "rate_limits.updated";

// ============================================================================
// Discriminator
// ============================================================================

/// The family an inbound tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    Session,
    Conversation,
    InputTranscription,
    Item,
    InputAudioBuffer,
    OutputAudioBuffer,
    AudioTranscript,
    Audio,
    Text,
    Refusal,
    ContentPart,
    FunctionCallArguments,
    OutputItem,
    ReasoningSummaryPart,
    ReasoningSummaryText,
    ReasoningText,
    Code,
    Response,
    RateLimits,
}

/// Ordered routing table. A longer prefix must come before any prefix it
/// extends; `Router::validate` checks this in tests.
pub static ROUTES: &[Route<EventKind>] = &[
    Route::exact("error", EventKind::Error),
    Route::prefix("session.", EventKind::Session),
    Route::prefix(
        "conversation.item.input_audio_transcription",
        EventKind::InputTranscription,
    ),
    Route::prefix("conversation.item.", EventKind::Item),
    Route::prefix("conversation.", EventKind::Conversation),
    Route::prefix("input_audio_buffer.", EventKind::InputAudioBuffer),
    Route::prefix("output_audio_buffer.", EventKind::OutputAudioBuffer),
    Route::prefix("response.audio_transcript", EventKind::AudioTranscript),
    Route::prefix("response.output_audio_transcript", EventKind::AudioTranscript),
    Route::prefix("response.audio", EventKind::Audio),
    Route::prefix("response.output_audio", EventKind::Audio),
    Route::prefix("response.content_part", EventKind::ContentPart),
    Route::prefix(
        "response.function_call_arguments",
        EventKind::FunctionCallArguments,
    ),
    Route::prefix("response.output_item", EventKind::OutputItem),
    Route::prefix("response.text", EventKind::Text),
    Route::prefix("response.output_text", EventKind::Text),
    Route::prefix("response.refusal", EventKind::Refusal),
    Route::prefix("response.reasoning_summary_part", EventKind::ReasoningSummaryPart),
    Route::prefix("response.reasoning_summary_text", EventKind::ReasoningSummaryText),
    Route::prefix("response.reasoning_text", EventKind::ReasoningText),
    Route::prefix("response.code_interpreter_call_code", EventKind::Code),
    Route::prefix("response.", EventKind::Response),
    Route::prefix("rate_limits", EventKind::RateLimits),
];

/// The router over [`ROUTES`].
pub const ROUTER: Router<EventKind> = Router::new(ROUTES);

/// Classifies a wire tag.
///
/// Fails with [`Error::UnrecognizedEventKind`] carrying the tag if no route
/// matches.
pub fn classify(tag: &str) -> Result<EventKind> {
    ROUTER
        .classify(tag)
        .ok_or_else(|| Error::UnrecognizedEventKind {
            kind: tag.to_string(),
            payload: None,
        })
}

/// Progress stage encoded in the tag's action suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `.added`, `.created`
    Added,
    /// `.delta`
    Delta,
    /// `.done`, `.completed`
    Done,
    /// Anything else (`.failed`, `.deleted`, `.truncated`, ...).
    Other,
}

impl Phase {
    pub fn of(tag: &str) -> Self {
        match action(tag) {
            "delta" => Phase::Delta,
            "done" | "completed" => Phase::Done,
            "added" | "created" => Phase::Added,
            _ => Phase::Other,
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// `error`
///
/// Realtime nests the details under `error`; Responses streams put them at
/// the top level. Both shapes are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

impl ErrorEvent {
    /// The error as an [`ApiError`].
    pub fn api_error(&self) -> ApiError {
        match &self.error {
            Some(info) => info.to_api_error(),
            None => ApiError {
                code: self.code.clone(),
                message: self.message.clone().unwrap_or_default(),
                param: self.param.clone(),
                ..Default::default()
            },
        }
    }
}

/// `session.created`, `session.updated`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub session: SessionResource,
}

/// `conversation.created`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub conversation: ConversationResource,
}

/// `conversation.item.*` except input transcription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub previous_item_id: Option<String>,
    /// Full item for created/added/done/retrieved.
    #[serde(default)]
    pub item: Option<ConversationItem>,
    /// Addressed item for deleted/truncated.
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub content_index: Option<usize>,
    #[serde(default)]
    pub audio_end_ms: Option<u64>,
}

/// `conversation.item.input_audio_transcription.*`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub content_index: Option<usize>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// `input_audio_buffer.*`, `output_audio_buffer.*`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub previous_item_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub audio_start_ms: Option<u64>,
    #[serde(default)]
    pub audio_end_ms: Option<u64>,
}

/// A text-like fragment addressed to an item field.
///
/// Shared by text, transcript, refusal, reasoning, code and function call
/// argument families. Delta events carry `delta`; done events carry the
/// settled value in a family-specific field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<usize>,
    #[serde(default)]
    pub content_index: Option<usize>,
    #[serde(default)]
    pub summary_index: Option<usize>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl FragmentEvent {
    /// The settled value carried by a done event, whichever field it uses.
    pub fn settled_value(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or(self.transcript.as_deref())
            .or(self.refusal.as_deref())
            .or(self.code.as_deref())
            .or(self.arguments.as_deref())
    }
}

/// `response.audio.*`, `response.output_audio.*`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<usize>,
    #[serde(default)]
    pub content_index: Option<usize>,
    /// Base64 audio chunk.
    #[serde(default)]
    pub delta: Option<String>,
    /// Decoded `delta`.
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
}

/// `response.content_part.*`, `response.reasoning_summary_part.*`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<usize>,
    #[serde(default)]
    pub content_index: Option<usize>,
    #[serde(default)]
    pub summary_index: Option<usize>,
    #[serde(default)]
    pub part: ContentPart,
}

/// `response.output_item.*`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<usize>,
    #[serde(default)]
    pub item: ConversationItem,
}

/// Any other `response.*` event: lifecycle (`response.created`,
/// `response.done`, `response.completed`, ...) and tool progress events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response: Option<ResponseResource>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<usize>,
}

impl ResponseEvent {
    /// Returns true for `response.<status>` tags, as opposed to nested
    /// progress events like `response.web_search_call.completed`.
    pub fn is_lifecycle(&self) -> bool {
        self.tag.matches('.').count() == 1
    }
}

/// `rate_limits.updated`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitsEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,
}

// ============================================================================
// Server Event
// ============================================================================

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Error(ErrorEvent),
    Session(SessionEvent),
    Conversation(ConversationEvent),
    InputTranscription(TranscriptionEvent),
    Item(ItemEvent),
    InputAudioBuffer(BufferEvent),
    OutputAudioBuffer(BufferEvent),
    AudioTranscript(FragmentEvent),
    Audio(AudioEvent),
    Text(FragmentEvent),
    Refusal(FragmentEvent),
    ContentPart(PartEvent),
    FunctionCallArguments(FragmentEvent),
    OutputItem(OutputItemEvent),
    ReasoningSummaryPart(PartEvent),
    ReasoningSummaryText(FragmentEvent),
    ReasoningText(FragmentEvent),
    Code(FragmentEvent),
    Response(ResponseEvent),
    RateLimits(RateLimitsEvent),
}

impl ServerEvent {
    /// Parses a JSON text message.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decodes a generic JSON object into its typed variant.
    ///
    /// A missing or unmatched `type` fails with
    /// [`Error::UnrecognizedEventKind`] carrying the tag and the payload.
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(kind) = ROUTER.classify(&tag) else {
            return Err(Error::UnrecognizedEventKind {
                kind: tag,
                payload: Some(value),
            });
        };

        let event = match kind {
            EventKind::Error => ServerEvent::Error(serde_json::from_value(value)?),
            EventKind::Session => ServerEvent::Session(serde_json::from_value(value)?),
            EventKind::Conversation => ServerEvent::Conversation(serde_json::from_value(value)?),
            EventKind::InputTranscription => {
                ServerEvent::InputTranscription(serde_json::from_value(value)?)
            }
            EventKind::Item => ServerEvent::Item(serde_json::from_value(value)?),
            EventKind::InputAudioBuffer => {
                ServerEvent::InputAudioBuffer(serde_json::from_value(value)?)
            }
            EventKind::OutputAudioBuffer => {
                ServerEvent::OutputAudioBuffer(serde_json::from_value(value)?)
            }
            EventKind::AudioTranscript => {
                ServerEvent::AudioTranscript(serde_json::from_value(value)?)
            }
            EventKind::Audio => {
                let mut event: AudioEvent = serde_json::from_value(value)?;
                if let Some(delta) = &event.delta {
                    event.audio = Some(base64::engine::general_purpose::STANDARD.decode(delta)?);
                }
                ServerEvent::Audio(event)
            }
            EventKind::Text => ServerEvent::Text(serde_json::from_value(value)?),
            EventKind::Refusal => ServerEvent::Refusal(serde_json::from_value(value)?),
            EventKind::ContentPart => ServerEvent::ContentPart(serde_json::from_value(value)?),
            EventKind::FunctionCallArguments => {
                ServerEvent::FunctionCallArguments(serde_json::from_value(value)?)
            }
            EventKind::OutputItem => ServerEvent::OutputItem(serde_json::from_value(value)?),
            EventKind::ReasoningSummaryPart => {
                ServerEvent::ReasoningSummaryPart(serde_json::from_value(value)?)
            }
            EventKind::ReasoningSummaryText => {
                ServerEvent::ReasoningSummaryText(serde_json::from_value(value)?)
            }
            EventKind::ReasoningText => ServerEvent::ReasoningText(serde_json::from_value(value)?),
            EventKind::Code => ServerEvent::Code(serde_json::from_value(value)?),
            EventKind::Response => ServerEvent::Response(serde_json::from_value(value)?),
            EventKind::RateLimits => ServerEvent::RateLimits(serde_json::from_value(value)?),
        };
        Ok(event)
    }

    /// The family of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Error(_) => EventKind::Error,
            ServerEvent::Session(_) => EventKind::Session,
            ServerEvent::Conversation(_) => EventKind::Conversation,
            ServerEvent::InputTranscription(_) => EventKind::InputTranscription,
            ServerEvent::Item(_) => EventKind::Item,
            ServerEvent::InputAudioBuffer(_) => EventKind::InputAudioBuffer,
            ServerEvent::OutputAudioBuffer(_) => EventKind::OutputAudioBuffer,
            ServerEvent::AudioTranscript(_) => EventKind::AudioTranscript,
            ServerEvent::Audio(_) => EventKind::Audio,
            ServerEvent::Text(_) => EventKind::Text,
            ServerEvent::Refusal(_) => EventKind::Refusal,
            ServerEvent::ContentPart(_) => EventKind::ContentPart,
            ServerEvent::FunctionCallArguments(_) => EventKind::FunctionCallArguments,
            ServerEvent::OutputItem(_) => EventKind::OutputItem,
            ServerEvent::ReasoningSummaryPart(_) => EventKind::ReasoningSummaryPart,
            ServerEvent::ReasoningSummaryText(_) => EventKind::ReasoningSummaryText,
            ServerEvent::ReasoningText(_) => EventKind::ReasoningText,
            ServerEvent::Code(_) => EventKind::Code,
            ServerEvent::Response(_) => EventKind::Response,
            ServerEvent::RateLimits(_) => EventKind::RateLimits,
        }
    }

    /// The wire tag.
    pub fn tag(&self) -> &str {
        match self {
            ServerEvent::Error(e) => &e.tag,
            ServerEvent::Session(e) => &e.tag,
            ServerEvent::Conversation(e) => &e.tag,
            ServerEvent::InputTranscription(e) => &e.tag,
            ServerEvent::Item(e) => &e.tag,
            ServerEvent::InputAudioBuffer(e) | ServerEvent::OutputAudioBuffer(e) => &e.tag,
            ServerEvent::Audio(e) => &e.tag,
            ServerEvent::ContentPart(e) | ServerEvent::ReasoningSummaryPart(e) => &e.tag,
            ServerEvent::OutputItem(e) => &e.tag,
            ServerEvent::Response(e) => &e.tag,
            ServerEvent::RateLimits(e) => &e.tag,
            ServerEvent::AudioTranscript(e)
            | ServerEvent::Text(e)
            | ServerEvent::Refusal(e)
            | ServerEvent::FunctionCallArguments(e)
            | ServerEvent::ReasoningSummaryText(e)
            | ServerEvent::ReasoningText(e)
            | ServerEvent::Code(e) => &e.tag,
        }
    }

    /// The server-assigned event id.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Error(e) => e.event_id.as_deref(),
            ServerEvent::Session(e) => e.event_id.as_deref(),
            ServerEvent::Conversation(e) => e.event_id.as_deref(),
            ServerEvent::InputTranscription(e) => e.event_id.as_deref(),
            ServerEvent::Item(e) => e.event_id.as_deref(),
            ServerEvent::InputAudioBuffer(e) | ServerEvent::OutputAudioBuffer(e) => {
                e.event_id.as_deref()
            }
            ServerEvent::Audio(e) => e.event_id.as_deref(),
            ServerEvent::ContentPart(e) | ServerEvent::ReasoningSummaryPart(e) => {
                e.event_id.as_deref()
            }
            ServerEvent::OutputItem(e) => e.event_id.as_deref(),
            ServerEvent::Response(e) => e.event_id.as_deref(),
            ServerEvent::RateLimits(e) => e.event_id.as_deref(),
            ServerEvent::AudioTranscript(e)
            | ServerEvent::Text(e)
            | ServerEvent::Refusal(e)
            | ServerEvent::FunctionCallArguments(e)
            | ServerEvent::ReasoningSummaryText(e)
            | ServerEvent::ReasoningText(e)
            | ServerEvent::Code(e) => e.event_id.as_deref(),
        }
    }

    /// The progress stage from the tag suffix.
    pub fn phase(&self) -> Phase {
        Phase::of(self.tag())
    }

    /// The conversation item this event addresses, if any.
    pub fn item_id(&self) -> Option<&str> {
        let id = match self {
            ServerEvent::Item(e) => e
                .item
                .as_ref()
                .and_then(|item| item.id.as_deref())
                .or(e.item_id.as_deref()),
            ServerEvent::InputTranscription(e) => e.item_id.as_deref(),
            ServerEvent::InputAudioBuffer(e) | ServerEvent::OutputAudioBuffer(e) => {
                e.item_id.as_deref()
            }
            ServerEvent::Audio(e) => e.item_id.as_deref(),
            ServerEvent::ContentPart(e) | ServerEvent::ReasoningSummaryPart(e) => {
                e.item_id.as_deref()
            }
            ServerEvent::OutputItem(e) => e.item.id.as_deref(),
            ServerEvent::Response(e) => e.item_id.as_deref(),
            ServerEvent::AudioTranscript(e)
            | ServerEvent::Text(e)
            | ServerEvent::Refusal(e)
            | ServerEvent::FunctionCallArguments(e)
            | ServerEvent::ReasoningSummaryText(e)
            | ServerEvent::ReasoningText(e)
            | ServerEvent::Code(e) => e.item_id.as_deref(),
            ServerEvent::Error(_)
            | ServerEvent::Session(_)
            | ServerEvent::Conversation(_)
            | ServerEvent::RateLimits(_) => None,
        };
        id.filter(|id| !id.is_empty())
    }

    /// The output position within the current response, if any.
    pub fn output_index(&self) -> Option<usize> {
        match self {
            ServerEvent::Audio(e) => e.output_index,
            ServerEvent::ContentPart(e) | ServerEvent::ReasoningSummaryPart(e) => e.output_index,
            ServerEvent::OutputItem(e) => e.output_index,
            ServerEvent::Response(e) => e.output_index,
            ServerEvent::AudioTranscript(e)
            | ServerEvent::Text(e)
            | ServerEvent::Refusal(e)
            | ServerEvent::FunctionCallArguments(e)
            | ServerEvent::ReasoningSummaryText(e)
            | ServerEvent::ReasoningText(e)
            | ServerEvent::Code(e) => e.output_index,
            _ => None,
        }
    }

    /// The response this event belongs to, if the payload names one.
    pub fn response_id(&self) -> Option<&str> {
        let id = match self {
            ServerEvent::Audio(e) => e.response_id.as_deref(),
            ServerEvent::ContentPart(e) | ServerEvent::ReasoningSummaryPart(e) => {
                e.response_id.as_deref()
            }
            ServerEvent::OutputItem(e) => e.response_id.as_deref(),
            ServerEvent::Response(e) => e.response.as_ref().map(|r| r.id.as_str()),
            ServerEvent::InputAudioBuffer(e) | ServerEvent::OutputAudioBuffer(e) => {
                e.response_id.as_deref()
            }
            ServerEvent::AudioTranscript(e)
            | ServerEvent::Text(e)
            | ServerEvent::Refusal(e)
            | ServerEvent::FunctionCallArguments(e)
            | ServerEvent::ReasoningSummaryText(e)
            | ServerEvent::ReasoningText(e)
            | ServerEvent::Code(e) => e.response_id.as_deref(),
            _ => None,
        };
        id.filter(|id| !id.is_empty())
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, ServerEvent::Error(_))
    }

    /// Returns true if this event ends a response.
    pub fn is_response_done(&self) -> bool {
        match self {
            ServerEvent::Response(e) => {
                e.is_lifecycle()
                    && matches!(
                        action(&e.tag),
                        "done" | "completed" | "failed" | "incomplete" | "cancelled"
                    )
            }
            _ => false,
        }
    }
}
