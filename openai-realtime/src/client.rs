//! Client for the OpenAI Realtime API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, Error, Result};
use crate::types::*;
use crate::websocket::WebSocketSession;

/// Default WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default HTTP endpoint, used for ephemeral session creation.
pub const DEFAULT_HTTP_URL: &str = "https://api.openai.com/v1/realtime";

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ORG_ID: &str = "OPENAI_ORG_ID";
pub const ENV_PROJECT_ID: &str = "OPENAI_PROJECT_ID";

const DEFAULT_BUFFER_SIZE: usize = 100;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI Realtime API client.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub api_key: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub ws_url: String,
    pub http_url: String,
    pub model: String,
    pub beta_header: bool,
    pub buffer_size: usize,
    pub http_timeout: Duration,
}

impl Client {
    /// Creates a client with default endpoints.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(api_key).build()
    }

    /// Creates a client from `OPENAI_API_KEY`, `OPENAI_ORG_ID` and
    /// `OPENAI_PROJECT_ID`.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    /// Returns a builder.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Opens a WebSocket session. Suitable for server-side applications.
    pub async fn connect_websocket(
        &self,
        config: Option<&ConnectConfig>,
    ) -> Result<WebSocketSession> {
        let model = config
            .map(|c| c.model.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.config.model.as_str());

        WebSocketSession::connect(&self.config, model).await
    }

    /// Creates an ephemeral session over HTTP and returns it with its
    /// short-lived client secret, for handing to browser clients.
    pub async fn create_ephemeral_session(&self, config: &SessionConfig) -> Result<SessionResource> {
        let mut body = config.to_json_value();
        if let Value::Object(map) = &mut body {
            map.entry("model")
                .or_insert_with(|| Value::String(self.config.model.clone()));
        }

        let url = format!("{}/sessions", self.config.http_url);
        debug!(%url, "creating ephemeral session");

        let http = reqwest::Client::builder()
            .timeout(self.config.http_timeout)
            .build()?;
        let mut request = http.post(&url).bearer_auth(&self.config.api_key).json(&body);
        if self.config.beta_header {
            request = request.header("OpenAI-Beta", "realtime=v1");
        }
        if let Some(org) = &self.config.organization {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.config.project {
            request = request.header("OpenAI-Project", project);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::Api(parse_http_error(&bytes, status.as_u16())));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn parse_http_error(body: &[u8], status: u16) -> ApiError {
    let info = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned())
        .and_then(|e| serde_json::from_value::<ErrorInfo>(e).ok());
    match info {
        Some(info) => ApiError {
            http_status: Some(status),
            ..info.to_api_error()
        },
        None => ApiError {
            message: String::from_utf8_lossy(body).into_owned(),
            http_status: Some(status),
            ..Default::default()
        },
    }
}

/// Builder for creating a Client with options.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    api_key: String,
    organization: Option<String>,
    project: Option<String>,
    ws_url: Option<String>,
    http_url: Option<String>,
    model: Option<String>,
    beta_header: bool,
    buffer_size: usize,
    http_timeout: Duration,
}

impl ClientBuilder {
    /// Creates a new client builder.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            organization: None,
            project: None,
            ws_url: None,
            http_url: None,
            model: None,
            beta_header: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Seeds a builder from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| Error::InvalidConfig(format!("{} is not set", ENV_API_KEY)))?;
        let mut builder = Self::new(api_key);
        builder.organization = std::env::var(ENV_ORG_ID).ok().filter(|s| !s.is_empty());
        builder.project = std::env::var(ENV_PROJECT_ID).ok().filter(|s| !s.is_empty());
        Ok(builder)
    }

    /// Sets the organization ID.
    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.organization = Some(org_id.into());
        self
    }

    /// Sets the project ID.
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project = Some(project_id.into());
        self
    }

    /// Sets the WebSocket URL.
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the HTTP URL.
    pub fn http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = Some(url.into());
        self
    }

    /// Sets the default model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sends `OpenAI-Beta: realtime=v1` (default true). Disable for the GA
    /// interface.
    pub fn beta_header(mut self, enabled: bool) -> Self {
        self.beta_header = enabled;
        self
    }

    /// Sets the inbound and outbound event buffer size.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Sets the timeout for HTTP calls.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<Client> {
        if self.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("API key is required".to_string()));
        }

        Ok(Client {
            config: Arc::new(ClientConfig {
                api_key: self.api_key,
                organization: self.organization,
                project: self.project,
                ws_url: self.ws_url.unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string()),
                http_url: self.http_url.unwrap_or_else(|| DEFAULT_HTTP_URL.to_string()),
                model: self.model.unwrap_or_else(|| MODEL_GPT_REALTIME.to_string()),
                beta_header: self.beta_header,
                buffer_size: self.buffer_size,
                http_timeout: self.http_timeout,
            }),
        })
    }
}
