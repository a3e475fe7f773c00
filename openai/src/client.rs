//! OpenAI API client.

use std::sync::Arc;
use std::time::Duration;

use super::{
    audio::AudioService,
    batches::BatchService,
    chat::ChatService,
    error::{Error, Result},
    http::HttpClient,
    images::ImageService,
    responses::ResponseService,
    vector_stores::VectorStoreService,
};

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default maximum number of retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_ORG_ID: &str = "OPENAI_ORG_ID";
pub const ENV_PROJECT_ID: &str = "OPENAI_PROJECT_ID";

/// OpenAI API client.
///
/// # Example
///
/// ```rust,no_run
/// use orca_openai::{ChatCompletionRequest, ChatMessage, Client};
///
/// # async fn run() -> orca_openai::Result<()> {
/// let client = Client::from_env()?;
/// let request = ChatCompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hello!")]);
/// let response = client.chat().create(&request).await?;
/// println!("{}", response.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    http: Arc<HttpClient>,
    config: ClientConfig,
}

/// Client configuration.
#[derive(Debug, Clone)]
struct ClientConfig {
    base_url: String,
    max_retries: u32,
    timeout: Duration,
}

impl Client {
    /// Creates a new client with default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(api_key).build()
    }

    /// Creates a client from `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
    /// `OPENAI_ORG_ID` and `OPENAI_PROJECT_ID`.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    /// Creates a new client builder for more configuration options.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Returns the chat completions service.
    pub fn chat(&self) -> ChatService {
        ChatService::new(self.http.clone())
    }

    /// Returns the audio service.
    pub fn audio(&self) -> AudioService {
        AudioService::new(self.http.clone())
    }

    /// Returns the image generation service.
    pub fn images(&self) -> ImageService {
        ImageService::new(self.http.clone())
    }

    /// Returns the batch service.
    pub fn batches(&self) -> BatchService {
        BatchService::new(self.http.clone())
    }

    /// Returns the vector store service.
    pub fn vector_stores(&self) -> VectorStoreService {
        VectorStoreService::new(self.http.clone())
    }

    /// Returns the Responses API service.
    pub fn responses(&self) -> ResponseService {
        ResponseService::new(self.http.clone())
    }

    /// Returns a reference to the internal HTTP client.
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }
}

/// Builder for creating an OpenAI API client.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
    max_retries: u32,
    timeout: Duration,
}

impl ClientBuilder {
    /// Creates a new client builder.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Seeds a builder from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_API_KEY)))?;
        let mut builder = Self::new(api_key);
        if let Some(url) = std::env::var(ENV_BASE_URL).ok().filter(|s| !s.is_empty()) {
            builder.base_url = url;
        }
        builder.organization = std::env::var(ENV_ORG_ID).ok().filter(|s| !s.is_empty());
        builder.project = std::env::var(ENV_PROJECT_ID).ok().filter(|s| !s.is_empty());
        Ok(builder)
    }

    /// Sets a custom base URL, e.g. for a proxy or a compatible server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.organization = Some(org_id.into());
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project = Some(project_id.into());
        self
    }

    /// Sets the maximum number of retries for transient errors.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<Client> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("api_key must be non-empty".to_string()));
        }

        let http = HttpClient::new(
            self.base_url.clone(),
            &self.api_key,
            self.organization.as_deref(),
            self.project.as_deref(),
            self.max_retries,
            self.timeout,
        )?;

        Ok(Client {
            http: Arc::new(http),
            config: ClientConfig {
                base_url: self.base_url,
                max_retries: self.max_retries,
                timeout: self.timeout,
            },
        })
    }
}
