//! Transport trait for realtime sessions.

use async_trait::async_trait;

use crate::client_event::ClientEvent;
use crate::error::Result;
use crate::event::ServerEvent;
use crate::types::*;

/// A bidirectional event transport.
///
/// Implementations deliver decoded [`ServerEvent`]s in arrival order and
/// accept raw JSON client events. Both the WebSocket transport and the
/// in-process [`ChannelSession`](crate::ChannelSession) satisfy it; the
/// helper methods are shared.
#[async_trait]
pub trait Session: Send + Sync {
    /// Sends a raw JSON event to the server.
    async fn send_raw(&self, event: serde_json::Value) -> Result<()>;

    /// Receives the next event from the server.
    ///
    /// Returns `None` when the session is closed. Per-event failures
    /// (unrecognized tag, malformed payload) are yielded as `Err` and the
    /// stream continues.
    async fn recv(&self) -> Option<Result<ServerEvent>>;

    /// Closes the session connection.
    async fn close(&self) -> Result<()>;

    /// Returns the session ID assigned by the server, once `session.created`
    /// has been received.
    fn session_id(&self) -> Option<String>;

    // === Typed events ===

    /// Sends a typed client event.
    async fn send(&self, event: ClientEvent) -> Result<()> {
        self.send_raw(event.to_value()?).await
    }

    // === Session Management ===

    /// Updates the session configuration.
    async fn update_session(&self, config: &SessionConfig) -> Result<()> {
        self.send(ClientEvent::session_update(config)).await
    }

    // === Audio Input ===

    /// Appends PCM audio to the input buffer. 24kHz, 16-bit, mono, little-endian.
    async fn append_audio(&self, audio: &[u8]) -> Result<()> {
        self.send(ClientEvent::append_audio(audio)).await
    }

    async fn append_audio_base64(&self, audio_base64: &str) -> Result<()> {
        self.send(ClientEvent::append_audio_base64(audio_base64))
            .await
    }

    /// Commits the audio buffer as a user message. Needed in manual turn mode.
    async fn commit_input(&self) -> Result<()> {
        self.send(ClientEvent::commit_input()).await
    }

    async fn clear_input(&self) -> Result<()> {
        self.send(ClientEvent::clear_input()).await
    }

    // === Conversation Management ===

    async fn add_user_message(&self, text: &str) -> Result<()> {
        self.send(ClientEvent::create_item(ConversationItem::user_text(text)))
            .await
    }

    /// Adds a user audio message. Audio is base64 encoded.
    async fn add_user_audio(&self, audio_base64: &str, transcript: Option<&str>) -> Result<()> {
        let item = ConversationItem::user_audio(audio_base64, transcript.map(str::to_string));
        self.send(ClientEvent::create_item(item)).await
    }

    async fn add_assistant_message(&self, text: &str) -> Result<()> {
        self.send(ClientEvent::create_item(ConversationItem::assistant_text(
            text,
        )))
        .await
    }

    async fn add_function_call_output(&self, call_id: &str, output: &str) -> Result<()> {
        let item = ConversationItem::function_call_output(call_id, output);
        self.send(ClientEvent::create_item(item)).await
    }

    /// Truncates assistant audio at `audio_end_ms`.
    async fn truncate_item(&self, item_id: &str, content_index: usize, audio_end_ms: u64) -> Result<()> {
        self.send(ClientEvent::truncate_item(item_id, content_index, audio_end_ms))
            .await
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.send(ClientEvent::delete_item(item_id)).await
    }

    // === Response Control ===

    /// Requests a response. In manual mode, call after `commit_input`.
    async fn create_response(&self, opts: Option<&ResponseCreateOptions>) -> Result<()> {
        self.send(ClientEvent::create_response(opts.cloned())).await
    }

    async fn cancel_response(&self) -> Result<()> {
        self.send(ClientEvent::cancel_response()).await
    }
}
