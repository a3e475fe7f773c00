//! Common types for the OpenAI HTTP API.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{Error, Result};

// ==================== Job Status ====================

/// Status of a long-running job (batches, vector store file batches).
///
/// Variants are ordered by progress; wire names of every job family map
/// onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "validating", alias = "queued")]
    NotStarted,
    #[serde(alias = "finalizing")]
    InProgress,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    /// Returns true once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::Failed | JobStatus::Expired
        )
    }

    /// Returns true once the job has reached the cancelling stage or any
    /// later one.
    pub fn cancel_requested(&self) -> bool {
        *self >= JobStatus::Cancelling
    }
}

/// A resource with a [`JobStatus`].
pub trait Job {
    fn id(&self) -> &str;
    fn status(&self) -> JobStatus;
    /// Server-provided failure reason, if any.
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Polls `fetch` every `interval` until the job is terminal or `timeout`
/// elapsed, and returns the last fetched state.
///
/// A failed job is reported as [`Error::JobFailed`].
pub(crate) async fn poll_job<T, F, Fut>(timeout: Duration, interval: Duration, mut fetch: F) -> Result<T>
where
    T: Job,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = fetch().await?;
        let status = job.status();
        if status == JobStatus::Failed {
            let reason = job.failure().unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::JobFailed(format!("{}: {}", job.id(), reason)));
        }
        if status.is_terminal() {
            return Ok(job);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            debug!(id = job.id(), ?status, "job still running at timeout");
            return Ok(job);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

// ==================== Lists ====================

/// A page of a cursor-paginated list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub object: String,
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Cursor parameters for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub after: Option<String>,
    pub before: Option<String>,
    /// "asc" or "desc".
    pub order: Option<String>,
}

impl ListParams {
    /// Renders the query string, including the leading `?` when non-empty.
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(format!("limit={}", limit));
        }
        if let Some(after) = &self.after {
            pairs.push(format!("after={}", after));
        }
        if let Some(before) = &self.before {
            pairs.push(format!("before={}", before));
        }
        if let Some(order) = &self.order {
            pairs.push(format!("order={}", order));
        }
        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    }
}

/// Reply of a delete endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionStatus {
    pub id: String,
    #[serde(default)]
    pub object: String,
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_wire_names() {
        let parse = |s: &str| serde_json::from_str::<JobStatus>(&format!("\"{}\"", s)).unwrap();
        assert_eq!(parse("validating"), JobStatus::NotStarted);
        assert_eq!(parse("queued"), JobStatus::NotStarted);
        assert_eq!(parse("in_progress"), JobStatus::InProgress);
        assert_eq!(parse("finalizing"), JobStatus::InProgress);
        assert_eq!(parse("cancelling"), JobStatus::Cancelling);
        assert_eq!(parse("expired"), JobStatus::Expired);
    }

    #[test]
    fn test_cancel_requested_ordering() {
        assert!(!JobStatus::InProgress.cancel_requested());
        assert!(JobStatus::Cancelling.cancel_requested());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_list_params_query() {
        assert_eq!(ListParams::default().to_query(), "");
        let params = ListParams {
            limit: Some(10),
            after: Some("batch_1".to_string()),
            ..Default::default()
        };
        assert_eq!(params.to_query(), "?limit=10&after=batch_1");
    }
}
