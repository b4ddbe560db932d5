//! Client for the GPU render worker.

use std::sync::Arc;
use std::time::Duration;

use hoit_core::types::JobId;
use serde::Serialize;

use crate::health::{self, HealthReport};
use crate::transport::{WorkerError, WorkerResponse, WorkerTransport};

/// Total timeout for a cancellation signal.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Path appended to the callback base to form the render webhook URL.
pub const RENDER_CALLBACK_PATH: &str = "/api/render/callback";

/// Body of `POST /render`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub job_id: JobId,
    pub video_url: String,
    pub scenario: serde_json::Value,
    pub options: serde_json::Value,
    pub callback_url: String,
}

/// HTTP client for one GPU render deployment.
#[derive(Clone)]
pub struct GpuRenderApi {
    transport: Arc<dyn WorkerTransport>,
    base_url: String,
    timeout: Duration,
}

impl GpuRenderApi {
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

    /// Submit a render. The worker reports progress via the callback URL.
    pub async fn render(&self, request: &RenderRequest) -> Result<WorkerResponse, WorkerError> {
        let body =
            serde_json::to_value(request).map_err(|e| WorkerError::Other(e.to_string()))?;
        self.transport
            .post_json(&format!("{}/render", self.base_url), &body, self.timeout)
            .await
    }

    /// Ask the worker to stop rendering `job_id`.
    pub async fn cancel(&self, job_id: JobId) -> Result<WorkerResponse, WorkerError> {
        self.transport
            .post_json(
                &format!("{}/api/render/{job_id}/cancel", self.base_url),
                &serde_json::json!({}),
                CANCEL_TIMEOUT,
            )
            .await
    }

    pub async fn health(&self) -> HealthReport {
        health::probe(self.transport.as_ref(), &self.base_url).await
    }
}
