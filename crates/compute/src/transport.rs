//! HTTP transport used to reach the external workers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Identifies this backend in outbound requests.
const USER_AGENT: &str = concat!("hoit-backend/", env!("CARGO_PKG_VERSION"));

/// Status and raw body of a worker response. Non-2xx statuses are not errors
/// at this layer; callers decide what a status means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResponse {
    pub status: u16,
    pub body: String,
}

impl WorkerResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker could not be reached (refused, DNS, reset during connect).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request exceeded its total timeout.
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Anything else: malformed URL, TLS, body errors.
    #[error("Request failed: {0}")]
    Other(String),
}

impl WorkerError {
    /// Only connection failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// POST `body` as JSON to `url` with a total timeout.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError>;

    /// GET `url` with a total timeout.
    async fn get(&self, url: &str, timeout: Duration) -> Result<WorkerResponse, WorkerError>;
}

/// [`WorkerTransport`] over a shared [`reqwest::Client`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WorkerError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (connection pooling across callers).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn finish(
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;
        Ok(WorkerResponse { status, body })
    }
}

#[async_trait]
impl WorkerTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        Self::finish(self.client.post(url).json(body), timeout).await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        Self::finish(self.client.get(url), timeout).await
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> WorkerError {
    if error.is_timeout() {
        WorkerError::Timeout(timeout)
    } else if error.is_connect() {
        WorkerError::Connect(error.to_string())
    } else {
        WorkerError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_errors_retry() {
        assert!(WorkerError::Connect("refused".into()).is_retryable());
        assert!(!WorkerError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!WorkerError::Other("tls".into()).is_retryable());
    }

    #[test]
    fn timeout_message_names_seconds() {
        let err = WorkerError::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "Request timed out after 300s");
    }

    #[test]
    fn response_json_is_optional() {
        assert!(WorkerResponse::new(500, "oops").json().is_none());
        assert_eq!(
            WorkerResponse::new(200, r#"{"a":1}"#).json(),
            Some(serde_json::json!({"a": 1}))
        );
    }
}
