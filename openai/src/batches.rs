//! Batch service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{
    error::Result,
    http::HttpClient,
    types::{Job, JobStatus, ListParams, ListResponse, poll_job},
};

/// Batch service.
pub struct BatchService {
    http: Arc<HttpClient>,
}

impl BatchService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Creates a batch from an uploaded JSONL input file.
    pub async fn create(&self, request: &BatchRequest) -> Result<Batch> {
        self.http.request(Method::POST, "/batches", Some(request)).await
    }

    pub async fn retrieve(&self, batch_id: &str) -> Result<Batch> {
        let path = format!("/batches/{}", batch_id);
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    /// Requests cancellation; the batch passes through `cancelling` first.
    pub async fn cancel(&self, batch_id: &str) -> Result<Batch> {
        let path = format!("/batches/{}/cancel", batch_id);
        self.http.request::<(), _>(Method::POST, &path, None).await
    }

    pub async fn list(&self, params: &ListParams) -> Result<ListResponse<Batch>> {
        let path = format!("/batches{}", params.to_query());
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    /// Polls until the batch is terminal or `timeout` elapses and returns
    /// the last state seen.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::time::Duration;
    /// # async fn run(client: orca_openai::Client) -> orca_openai::Result<()> {
    /// let batch = client
    ///     .batches()
    ///     .wait_for_terminal("batch_abc", Duration::from_secs(3600), Duration::from_secs(30))
    ///     .await?;
    /// println!("{:?} -> {:?}", batch.status, batch.output_file_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn wait_for_terminal(
        &self,
        batch_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Batch> {
        poll_job(timeout, interval, || self.retrieve(batch_id)).await
    }
}

// ==================== Request/Response Types ====================

/// Request for creating a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    pub input_file_id: String,
    /// e.g. "/v1/chat/completions", "/v1/responses".
    pub endpoint: String,
    pub completion_window: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl BatchRequest {
    pub fn new(input_file_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            input_file_id: input_file_id.into(),
            endpoint: endpoint.into(),
            completion_window: "24h".to_string(),
            metadata: None,
        }
    }
}

/// A batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub id: String,
    pub object: String,
    pub endpoint: String,
    pub input_file_id: String,
    pub completion_window: String,
    pub status: JobStatus,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub errors: Option<BatchErrors>,
    pub created_at: i64,
    pub in_progress_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub request_counts: Option<RequestCounts>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Job for Batch {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn failure(&self) -> Option<String> {
        let errors = self.errors.as_ref()?;
        let messages: Vec<&str> = errors.data.iter().map(|e| e.message.as_str()).collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchErrors {
    pub object: String,
    pub data: Vec<BatchError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchError {
    pub code: String,
    pub message: String,
    pub param: Option<String>,
    pub line: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCounts {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}
