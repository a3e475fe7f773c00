//! HTTP client implementation for the OpenAI API.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{
    Client as ReqwestClient, Method, RequestBuilder, Response,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
    multipart,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::error::{Error, Result};

const USER_AGENT_VALUE: &str = "orca-openai-rust/0.1";

/// HTTP client for the OpenAI API.
pub struct HttpClient {
    client: ReqwestClient,
    base_url: String,
    headers: HeaderMap,
    max_retries: u32,
}

impl HttpClient {
    /// Creates a new HTTP client.
    pub fn new(
        base_url: String,
        api_key: &str,
        organization: Option<&str>,
        project: Option<&str>,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header(&format!("Bearer {}", api_key))?);
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(org) = organization {
            headers.insert("OpenAI-Organization", header(org)?);
        }
        if let Some(project) = project {
            headers.insert("OpenAI-Project", header(project)?);
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            max_retries,
        })
    }

    /// Sends a JSON request with retry support and decodes the JSON reply.
    pub async fn request<T, R>(&self, method: Method, path: &str, body: Option<&T>) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let bytes = self
            .with_retry(path, || {
                let mut request = self.builder(method.clone(), path);
                if let Some(body) = body {
                    request = request.json(body);
                }
                request
            })
            .await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    /// Sends a JSON request and returns the raw reply body.
    pub async fn request_bytes<T>(&self, method: Method, path: &str, body: Option<&T>) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        self.with_retry(path, || {
            let mut request = self.builder(method.clone(), path);
            if let Some(body) = body {
                request = request.json(body);
            }
            request
        })
        .await
    }

    /// Sends a multipart form. Forms cannot be replayed, so there is no retry.
    pub async fn request_multipart<R>(&self, path: &str, form: multipart::Form) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self.builder(Method::POST, path).multipart(form).send().await?;
        let bytes = read_body(response).await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    /// Makes a streaming request and returns the raw byte stream.
    pub async fn request_stream<T>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<impl Stream<Item = Result<Bytes>> + use<T>>
    where
        T: Serialize + ?Sized,
    {
        let response = self
            .builder(Method::POST, path)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(handle_error_response(response).await);
        }

        Ok(response.bytes_stream().map(|r| r.map_err(Error::from)))
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url).headers(self.headers.clone())
    }

    async fn with_retry<F>(&self, path: &str, build: F) -> Result<Bytes>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(path, attempt, ?backoff, "retrying request");
                tokio::time::sleep(backoff).await;
            }

            let result = match build().send().await {
                Ok(response) => read_body(response).await,
                Err(e) => Err(Error::from(e)),
            };
            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other("max retries exceeded".to_string())))
    }
}

fn header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Config(format!("invalid header value: {}", e)))
}

async fn read_body(response: Response) -> Result<Bytes> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(parse_error(&body, status.as_u16()));
    }
    Ok(body)
}

async fn handle_error_response(response: Response) -> Error {
    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(body) => parse_error(&body, status),
        Err(e) => Error::Http(e),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    param: Option<String>,
}

/// Parses an error response body.
pub(crate) fn parse_error(body: &[u8], status: u16) -> Error {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => Error::Api {
            status,
            error_type: envelope.error.error_type,
            code: envelope.error.code.map(|c| match c {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            message: envelope.error.message,
            param: envelope.error.param,
        },
        Err(_) => Error::api(status, String::from_utf8_lossy(body).into_owned()),
    }
}

/// SSE (Server-Sent Events) reader.
///
/// Joins multi-line `data:` fields, skips comments and other fields, and ends
/// at `data: [DONE]` or at the end of the stream.
pub struct SseReader<S> {
    stream: S,
    buffer: String,
    done: bool,
}

impl<S> SseReader<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: String::new(),
            done: false,
        }
    }

    /// Reads the data of the next event; `None` at the end of the stream.
    pub async fn read_event(&mut self) -> Result<Option<String>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(data) = self.extract_event() {
                if data == "[DONE]" {
                    self.done = true;
                    return Ok(None);
                }
                return Ok(Some(data));
            }

            match self.stream.next().await {
                Some(Ok(bytes)) => {
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&bytes).replace("\r\n", "\n"));
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.done = true;
                    // A final event without the trailing blank line.
                    let rest = std::mem::take(&mut self.buffer);
                    return Ok(event_data(&rest).filter(|d| d != "[DONE]"));
                }
            }
        }
    }

    /// Extracts the data of the next complete event that has any.
    fn extract_event(&mut self) -> Option<String> {
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&block) {
                return Some(data);
            }
        }
        None
    }
}

fn event_data(block: &str) -> Option<String> {
    let lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_envelope() {
        let err = parse_error(
            br#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#,
            429,
        );
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());
        match err {
            Error::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("rate_limit_exceeded"));
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_plain_body() {
        let err = parse_error(b"upstream connect error", 503);
        assert!(err.is_server_error());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_event_data_joins_lines() {
        assert_eq!(event_data("event: x\ndata: a\ndata: b\n\n").as_deref(), Some("a\nb"));
        assert_eq!(event_data(": keep-alive\n\n"), None);
    }
}
