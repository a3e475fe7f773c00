//! Client events sent to the server.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::*;

pub const EVENT_TYPE_SESSION_UPDATE: &str = "session.update";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_APPEND: &str = "input_audio_buffer.append";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_COMMIT: &str = "input_audio_buffer.commit";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_CLEAR: &str = "input_audio_buffer.clear";
pub const EVENT_TYPE_CONVERSATION_ITEM_CREATE: &str = "conversation.item.create";
pub const EVENT_TYPE_CONVERSATION_ITEM_TRUNCATE: &str = "conversation.item.truncate";
pub const EVENT_TYPE_CONVERSATION_ITEM_DELETE: &str = "conversation.item.delete";
pub const EVENT_TYPE_CONVERSATION_ITEM_RETRIEVE: &str = "conversation.item.retrieve";
pub const EVENT_TYPE_RESPONSE_CREATE: &str = "response.create";
pub const EVENT_TYPE_RESPONSE_CANCEL: &str = "response.cancel";

/// An outbound event.
///
/// Constructors fill `event_id` with a fresh `evt_` id so server errors can
/// be correlated back to the request that caused them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: Value,
    },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
        content_index: usize,
        audio_end_ms: u64,
    },

    #[serde(rename = "conversation.item.delete")]
    ConversationItemDelete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
    },

    #[serde(rename = "conversation.item.retrieve")]
    ConversationItemRetrieve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
    },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseCreateOptions>,
    },

    #[serde(rename = "response.cancel")]
    ResponseCancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
}

impl ClientEvent {
    pub fn session_update(config: &SessionConfig) -> Self {
        ClientEvent::SessionUpdate {
            event_id: Some(generate_event_id()),
            session: config.to_json_value(),
        }
    }

    /// Appends PCM audio, encoding it as base64.
    pub fn append_audio(audio: &[u8]) -> Self {
        Self::append_audio_base64(base64::engine::general_purpose::STANDARD.encode(audio))
    }

    pub fn append_audio_base64(audio_base64: impl Into<String>) -> Self {
        ClientEvent::InputAudioBufferAppend {
            event_id: Some(generate_event_id()),
            audio: audio_base64.into(),
        }
    }

    pub fn commit_input() -> Self {
        ClientEvent::InputAudioBufferCommit {
            event_id: Some(generate_event_id()),
        }
    }

    pub fn clear_input() -> Self {
        ClientEvent::InputAudioBufferClear {
            event_id: Some(generate_event_id()),
        }
    }

    /// Adds an item at the end of the conversation.
    pub fn create_item(item: ConversationItem) -> Self {
        ClientEvent::ConversationItemCreate {
            event_id: Some(generate_event_id()),
            previous_item_id: None,
            item,
        }
    }

    /// Adds an item directly after `previous_item_id`.
    pub fn create_item_after(item: ConversationItem, previous_item_id: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            event_id: Some(generate_event_id()),
            previous_item_id: Some(previous_item_id.into()),
            item,
        }
    }

    pub fn truncate_item(item_id: impl Into<String>, content_index: usize, audio_end_ms: u64) -> Self {
        ClientEvent::ConversationItemTruncate {
            event_id: Some(generate_event_id()),
            item_id: item_id.into(),
            content_index,
            audio_end_ms,
        }
    }

    pub fn delete_item(item_id: impl Into<String>) -> Self {
        ClientEvent::ConversationItemDelete {
            event_id: Some(generate_event_id()),
            item_id: item_id.into(),
        }
    }

    pub fn retrieve_item(item_id: impl Into<String>) -> Self {
        ClientEvent::ConversationItemRetrieve {
            event_id: Some(generate_event_id()),
            item_id: item_id.into(),
        }
    }

    /// Requests a response; `None` uses the session defaults.
    pub fn create_response(options: Option<ResponseCreateOptions>) -> Self {
        ClientEvent::ResponseCreate {
            event_id: Some(generate_event_id()),
            response: options,
        }
    }

    pub fn cancel_response() -> Self {
        ClientEvent::ResponseCancel {
            event_id: Some(generate_event_id()),
            response_id: None,
        }
    }

    /// The wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => EVENT_TYPE_SESSION_UPDATE,
            ClientEvent::InputAudioBufferAppend { .. } => EVENT_TYPE_INPUT_AUDIO_BUFFER_APPEND,
            ClientEvent::InputAudioBufferCommit { .. } => EVENT_TYPE_INPUT_AUDIO_BUFFER_COMMIT,
            ClientEvent::InputAudioBufferClear { .. } => EVENT_TYPE_INPUT_AUDIO_BUFFER_CLEAR,
            ClientEvent::ConversationItemCreate { .. } => EVENT_TYPE_CONVERSATION_ITEM_CREATE,
            ClientEvent::ConversationItemTruncate { .. } => EVENT_TYPE_CONVERSATION_ITEM_TRUNCATE,
            ClientEvent::ConversationItemDelete { .. } => EVENT_TYPE_CONVERSATION_ITEM_DELETE,
            ClientEvent::ConversationItemRetrieve { .. } => EVENT_TYPE_CONVERSATION_ITEM_RETRIEVE,
            ClientEvent::ResponseCreate { .. } => EVENT_TYPE_RESPONSE_CREATE,
            ClientEvent::ResponseCancel { .. } => EVENT_TYPE_RESPONSE_CANCEL,
        }
    }

    /// The client-assigned event id.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::InputAudioBufferAppend { event_id, .. }
            | ClientEvent::InputAudioBufferCommit { event_id }
            | ClientEvent::InputAudioBufferClear { event_id }
            | ClientEvent::ConversationItemCreate { event_id, .. }
            | ClientEvent::ConversationItemTruncate { event_id, .. }
            | ClientEvent::ConversationItemDelete { event_id, .. }
            | ClientEvent::ConversationItemRetrieve { event_id, .. }
            | ClientEvent::ResponseCreate { event_id, .. }
            | ClientEvent::ResponseCancel { event_id, .. } => event_id.as_deref(),
        }
    }

    /// Serializes to a JSON object.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Generates a client event id.
pub fn generate_event_id() -> String {
    format!("evt_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
