//! Vector store service, including file batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error::Result,
    http::HttpClient,
    types::{DeletionStatus, Job, JobStatus, ListParams, ListResponse, poll_job},
};

/// Vector store service.
pub struct VectorStoreService {
    http: Arc<HttpClient>,
}

impl VectorStoreService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn create(&self, request: &VectorStoreRequest) -> Result<VectorStore> {
        self.http
            .request(Method::POST, "/vector_stores", Some(request))
            .await
    }

    pub async fn retrieve(&self, vector_store_id: &str) -> Result<VectorStore> {
        let path = format!("/vector_stores/{}", vector_store_id);
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    pub async fn delete(&self, vector_store_id: &str) -> Result<DeletionStatus> {
        let path = format!("/vector_stores/{}", vector_store_id);
        self.http.request::<(), _>(Method::DELETE, &path, None).await
    }

    pub async fn list(&self, params: &ListParams) -> Result<ListResponse<VectorStore>> {
        let path = format!("/vector_stores{}", params.to_query());
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    // ==================== File Batches ====================

    /// Attaches uploaded files to a vector store in one batch.
    pub async fn create_file_batch(
        &self,
        vector_store_id: &str,
        request: &FileBatchRequest,
    ) -> Result<FileBatch> {
        let path = format!("/vector_stores/{}/file_batches", vector_store_id);
        self.http.request(Method::POST, &path, Some(request)).await
    }

    pub async fn retrieve_file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        let path = format!("/vector_stores/{}/file_batches/{}", vector_store_id, batch_id);
        self.http.request::<(), _>(Method::GET, &path, None).await
    }

    pub async fn cancel_file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        let path = format!(
            "/vector_stores/{}/file_batches/{}/cancel",
            vector_store_id, batch_id
        );
        self.http.request::<(), _>(Method::POST, &path, None).await
    }

    /// Polls a file batch until it is terminal or `timeout` elapses.
    pub async fn wait_for_file_batch(
        &self,
        vector_store_id: &str,
        batch_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<FileBatch> {
        poll_job(timeout, interval, || {
            self.retrieve_file_batch(vector_store_id, batch_id)
        })
        .await
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_after: Option<ExpiresAfter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking_strategy: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Expiration policy; `anchor` is "last_active_at".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiresAfter {
    pub anchor: String,
    pub days: u32,
}

/// A vector store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStore {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    pub name: String,
    pub usage_bytes: u64,
    pub file_counts: FileCounts,
    /// "expired", "in_progress" or "completed".
    pub status: String,
    pub expires_after: Option<ExpiresAfter>,
    pub expires_at: Option<i64>,
    pub last_active_at: Option<i64>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCounts {
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileBatchRequest {
    pub file_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking_strategy: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, Value>>,
}

impl FileBatchRequest {
    pub fn new(file_ids: Vec<String>) -> Self {
        Self {
            file_ids,
            ..Default::default()
        }
    }
}

/// A batch of files being attached to a vector store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBatch {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    pub vector_store_id: String,
    pub status: JobStatus,
    pub file_counts: FileCounts,
}

impl Job for FileBatch {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn failure(&self) -> Option<String> {
        (self.file_counts.failed > 0).then(|| {
            format!(
                "{} of {} files failed",
                self.file_counts.failed, self.file_counts.total
            )
        })
    }
}
