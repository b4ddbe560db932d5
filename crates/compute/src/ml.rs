//! Client for the ML (speech/emotion analysis) worker.

use std::sync::Arc;
use std::time::Duration;

use hoit_core::types::JobId;
use serde::Serialize;

use crate::health::{self, HealthReport};
use crate::transport::{WorkerError, WorkerResponse, WorkerTransport};

/// Language sent when the client did not pick one.
pub const AUTO_LANGUAGE: &str = "auto";

/// Body of `POST /api/upload-video/process-video`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessVideoRequest {
    pub job_id: JobId,
    pub video_url: String,
    /// Base URL the worker calls back on (`{base}/api/upload-video/result`).
    pub fastapi_base_url: String,
    pub language: String,
}

/// HTTP client for one ML worker deployment.
#[derive(Clone)]
pub struct MlServerApi {
    transport: Arc<dyn WorkerTransport>,
    base_url: String,
    timeout: Duration,
}

impl MlServerApi {
    /// * `base_url` - e.g. `http://ml-server:8080`, without trailing slash.
    /// * `timeout` - total timeout for a processing request.
    pub fn new(transport: Arc<dyn WorkerTransport>, base_url: String, timeout: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the worker to start processing. The worker acknowledges
    /// immediately and reports results through the callback endpoint.
    pub async fn process_video(
        &self,
        request: &ProcessVideoRequest,
    ) -> Result<WorkerResponse, WorkerError> {
        let body =
            serde_json::to_value(request).map_err(|e| WorkerError::Other(e.to_string()))?;
        self.transport
            .post_json(
                &format!("{}/api/upload-video/process-video", self.base_url),
                &body,
                self.timeout,
            )
            .await
    }

    pub async fn health(&self) -> HealthReport {
        health::probe(self.transport.as_ref(), &self.base_url).await
    }
}
