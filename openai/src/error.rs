//! Error types for the OpenAI HTTP client.

use thiserror::Error;

/// Result type alias for OpenAI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for OpenAI API operations.
#[derive(Error, Debug)]
pub enum Error {
    /// API error returned by OpenAI.
    #[error("openai: {message} (status={status}, type={error_type:?}, code={code:?})")]
    Api {
        status: u16,
        error_type: Option<String>,
        code: Option<String>,
        message: String,
        param: Option<String>,
    },

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A batch or file batch ended in a failed state.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// A server-sent event stream broke off or carried garbage.
    #[error("stream error: {0}")]
    Stream(String),

    /// Event decoding or reconciliation error.
    #[error(transparent)]
    Realtime(#[from] orca_openai_realtime::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an API error from the status and message only.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            error_type: None,
            code: None,
            message: message.into(),
            param: None,
        }
    }

    /// Returns the HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if this is a rate limit error.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Error::Api {
                status, error_type, ..
            } => *status == 429 || error_type.as_deref() == Some("rate_limit_exceeded"),
            _ => false,
        }
    }

    /// Returns true if this is an invalid API key error.
    pub fn is_invalid_api_key(&self) -> bool {
        match self {
            Error::Api { status, code, .. } => {
                *status == 401 || code.as_deref() == Some("invalid_api_key")
            }
            _ => false,
        }
    }

    /// Returns true if this is a server-side error.
    pub fn is_server_error(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the request can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => self.is_rate_limit() || self.is_server_error(),
        }
    }
}
