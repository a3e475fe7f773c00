//! Wire types shared by client and server events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ============================================================================
// Models, formats, voices
// ============================================================================

/// Default realtime model.
pub const MODEL_GPT_REALTIME: &str = "gpt-realtime";
/// GPT-4o realtime preview model.
pub const MODEL_GPT4O_REALTIME_PREVIEW: &str = "gpt-4o-realtime-preview";
/// GPT-4o mini realtime preview model.
pub const MODEL_GPT4O_MINI_REALTIME_PREVIEW: &str = "gpt-4o-mini-realtime-preview";

/// 16-bit PCM audio at 24kHz, mono, little-endian.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";
/// G.711 μ-law audio at 8kHz.
pub const AUDIO_FORMAT_G711_ULAW: &str = "g711_ulaw";
/// G.711 A-law audio at 8kHz.
pub const AUDIO_FORMAT_G711_ALAW: &str = "g711_alaw";

pub const VOICE_ALLOY: &str = "alloy";
pub const VOICE_ASH: &str = "ash";
pub const VOICE_CORAL: &str = "coral";
pub const VOICE_SAGE: &str = "sage";
pub const VOICE_VERSE: &str = "verse";

/// Server-side voice activity detection.
pub const VAD_SERVER_VAD: &str = "server_vad";
/// Semantic voice activity detection.
pub const VAD_SEMANTIC_VAD: &str = "semantic_vad";

pub const MODALITY_TEXT: &str = "text";
pub const MODALITY_AUDIO: &str = "audio";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for establishing a realtime connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Model id. Empty selects [`MODEL_GPT_REALTIME`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
}

/// Session parameters sent with `session.update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,

    /// `None` keeps the server's current setting; see `turn_detection_disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Sends `"turn_detection": null`, switching the session to manual turns.
    #[serde(skip)]
    pub turn_detection_disabled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    /// "auto", "none", "required", or a specific function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// A token count or "inf".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<Value>,
}

impl SessionConfig {
    /// Creates a config with turn detection disabled (manual mode).
    pub fn with_vad_disabled() -> Self {
        Self {
            turn_detection_disabled: true,
            ..Default::default()
        }
    }

    /// Renders the `session` object of a `session.update` event.
    pub fn to_json_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if self.turn_detection_disabled {
            if let Value::Object(map) = &mut value {
                map.insert("turn_detection".to_string(), Value::Null);
            }
        }
        value
    }
}

/// Input transcription configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription model, e.g. "whisper-1".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Voice activity detection configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    /// "server_vad" or "semantic_vad".
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub detection_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_response: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_response: Option<bool>,

    /// "low", "medium" or "high" for semantic_vad.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eagerness: Option<String>,
}

/// Function tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl Tool {
    /// Creates a function tool.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Per-response overrides for `response.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCreateOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<Value>,

    /// "auto" (default) or "none" for out-of-band responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,

    /// Input items used instead of the conversation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<ConversationItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ============================================================================
// Resources
// ============================================================================

/// Session state reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionResource {
    pub id: String,
    pub object: String,
    pub model: String,
    pub expires_at: i64,
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: Option<TranscriptionConfig>,
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<Value>,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<Value>,
    /// Ephemeral key, present on sessions created over HTTP.
    pub client_secret: Option<ClientSecret>,
}

/// Ephemeral client secret for browser/WebRTC clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSecret {
    pub value: String,
    pub expires_at: i64,
}

/// Conversation resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationResource {
    pub id: String,
    pub object: String,
}

/// A conversation item as it appears on the wire.
///
/// Items are messages, function calls, function call outputs, reasoning blocks
/// and code interpreter calls; every field besides `type` is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// "message", "function_call", "function_call_output", "reasoning", ...
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// "user", "assistant", "system", "developer"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    /// Reasoning summary fragments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summary: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Source of a code interpreter call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ConversationItem {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::message("user", ContentPart::input_text(text))
    }

    /// A system text message.
    pub fn system_text(text: impl Into<String>) -> Self {
        Self::message("system", ContentPart::input_text(text))
    }

    /// An assistant text message.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::message(
            "assistant",
            ContentPart {
                part_type: Some("text".to_string()),
                text: Some(text.into()),
                ..Default::default()
            },
        )
    }

    /// A user audio message; audio is base64 encoded.
    pub fn user_audio(audio_base64: impl Into<String>, transcript: Option<String>) -> Self {
        Self::message(
            "user",
            ContentPart {
                part_type: Some("input_audio".to_string()),
                audio: Some(audio_base64.into()),
                transcript,
                ..Default::default()
            },
        )
    }

    /// The output of a function call, correlated by `call_id`.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: Some("function_call_output".to_string()),
            call_id: Some(call_id.into()),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    fn message(role: &str, part: ContentPart) -> Self {
        Self {
            item_type: Some("message".to_string()),
            role: Some(role.to_string()),
            content: vec![part],
            ..Default::default()
        }
    }
}

/// A content part of a message, or a reasoning summary fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// "input_text", "input_audio", "item_reference", "text", "audio",
    /// "output_text", "refusal", "reasoning_text", "summary_text", ...
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 encoded audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Referenced item id for "item_reference".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self {
            part_type: Some("input_text".to_string()),
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Response resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseResource {
    pub id: String,
    pub object: String,
    /// "in_progress", "completed", "cancelled", "incomplete", "failed"
    pub status: String,
    pub status_details: Option<StatusDetails>,
    pub output: Vec<ConversationItem>,
    pub usage: Option<Usage>,
    pub metadata: Option<Value>,
}

/// Why a response ended the way it did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusDetails {
    #[serde(rename = "type")]
    pub details_type: String,
    pub reason: String,
    pub error: Option<ErrorInfo>,
}

/// Error payload embedded in events and resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

impl ErrorInfo {
    /// Converts to an [`ApiError`](crate::ApiError).
    pub fn to_api_error(&self) -> crate::error::ApiError {
        crate::error::ApiError {
            error_type: self.error_type.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
            param: self.param.clone(),
            event_id: self.event_id.clone(),
            http_status: None,
        }
    }
}

/// Token usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_token_details: Option<TokenDetails>,
    pub output_token_details: Option<TokenDetails>,
}

/// Token breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenDetails {
    pub cached_tokens: u64,
    pub text_tokens: u64,
    pub audio_tokens: u64,
    pub reasoning_tokens: u64,
}

/// One rate limit bucket from `rate_limits.updated`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// "requests" or "tokens".
    pub name: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_seconds: f64,
}

/// Wraps an error message the way tool outputs report failures.
pub fn error_output(message: &str) -> String {
    json!({ "error": message }).to_string()
}
