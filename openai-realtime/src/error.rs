//! Error types for the realtime client and stream reconciliation.

use std::fmt;

use thiserror::Error;

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the realtime client.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// API error returned by the server.
    #[error("api error: {0}")]
    Api(ApiError),

    /// The transport is closed.
    #[error("session closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation did not finish in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// An inbound event carried a tag that matches no known family.
    #[error("unrecognized event kind: {kind:?}")]
    UnrecognizedEventKind {
        kind: String,
        payload: Option<serde_json::Value>,
    },

    /// A conversation item violates the content-type-per-role rules.
    #[error("invalid item shape: {0}")]
    InvalidItemShape(String),

    /// Events arrived in an order the protocol does not promise.
    #[error("protocol ordering anomaly: {0}")]
    ProtocolOrderingAnomaly(Anomaly),

    /// A tool call could not be completed.
    #[error("tool invocation failed for {call_id}: {message}")]
    ToolInvocation { call_id: String, message: String },

    /// Tool output was submitted for a call id that is not pending.
    #[error("unknown tool call: {0}")]
    UnknownToolCall(String),
}

impl Error {
    /// Returns true if the error concerns a single inbound event and the
    /// stream can continue past it.
    pub fn is_event_local(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedEventKind { .. }
                | Error::InvalidItemShape(_)
                | Error::ProtocolOrderingAnomaly(_)
                | Error::Json(_)
                | Error::Decode(_)
        )
    }

    /// Returns true if this is an API error sent by the server.
    pub fn is_api(&self) -> bool {
        matches!(self, Error::Api(_))
    }
}

/// API error from the realtime server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiError {
    /// Error type (e.g., "invalid_request_error").
    pub error_type: Option<String>,
    /// Error code (e.g., "invalid_value").
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Parameter that caused the error.
    pub param: Option<String>,
    /// Client event id that caused the error.
    pub event_id: Option<String>,
    /// HTTP status code, if the error came over HTTP.
    pub http_status: Option<u16>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code.as_deref().or(self.error_type.as_deref()) {
            Some(label) => write!(f, "{}: {}", label, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A protocol ordering problem observed while merging events.
///
/// Anomalies never abort a stream: the event is merged on a best-effort basis
/// and the anomaly is logged and recorded on the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// An event referenced an item that was never created.
    UnknownItem { item_id: String, tag: String },

    /// A content/summary fragment referenced an index never announced.
    UnknownPart {
        item_id: Option<String>,
        index: usize,
        tag: String,
    },

    /// A forward index skipped positions, which were filled with placeholders.
    IndexGap {
        item_id: Option<String>,
        index: usize,
        gap: usize,
    },

    /// A delta arrived for an item that had already reached a terminal status.
    PostTerminalDelta { item_id: Option<String>, tag: String },

    /// A second terminal event carried content different from the first.
    ConflictingTerminal { item_id: Option<String>, tag: String },

    /// `previous_item_id` named an item this conversation does not hold.
    UnknownPreviousItem {
        item_id: Option<String>,
        previous_item_id: String,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |v: &Option<String>| v.clone().unwrap_or_else(|| "<none>".to_string());
        match self {
            Anomaly::UnknownItem { item_id, tag } => {
                write!(f, "{} references unknown item {}", tag, item_id)
            }
            Anomaly::UnknownPart {
                item_id,
                index,
                tag,
            } => write!(
                f,
                "{} references unannounced part {} of item {}",
                tag,
                index,
                id(item_id)
            ),
            Anomaly::IndexGap {
                item_id,
                index,
                gap,
            } => write!(
                f,
                "index {} of item {} skipped {} position(s)",
                index,
                id(item_id),
                gap
            ),
            Anomaly::PostTerminalDelta { item_id, tag } => {
                write!(f, "{} after item {} finished", tag, id(item_id))
            }
            Anomaly::ConflictingTerminal { item_id, tag } => {
                write!(f, "{} changed finished item {}", tag, id(item_id))
            }
            Anomaly::UnknownPreviousItem {
                item_id,
                previous_item_id,
            } => write!(
                f,
                "item {} placed after unknown item {}",
                id(item_id),
                previous_item_id
            ),
        }
    }
}

/// A tool the caller invoked for a function call failed.
///
/// Submitted in place of the tool's output; the server receives
/// `{"error": message}` and the rest of the exchange carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ToolInvocationError {
    pub message: String,
}

impl ToolInvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
