//! Worker health probes.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::transport::{WorkerError, WorkerTransport};

/// Total timeout for a health probe.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters of the worker's health body echoed back.
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    ConnectionFailed,
    Timeout,
    Error,
}

/// Result of probing `{base_url}/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub server_url: String,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET `{base_url}/health` and describe the outcome. Never fails.
pub async fn probe(transport: &dyn WorkerTransport, base_url: &str) -> HealthReport {
    let started = Instant::now();
    let result = transport
        .get(&format!("{base_url}/health"), HEALTH_TIMEOUT)
        .await;
    let response_time_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

    let mut report = HealthReport {
        status: HealthStatus::Healthy,
        server_url: base_url.to_string(),
        response_time_ms,
        http_status: None,
        response: None,
        timeout_seconds: None,
        error: None,
    };

    match result {
        Ok(response) if response.status == 200 => {
            report.http_status = Some(response.status);
            report.response = Some(response.body.chars().take(BODY_PREVIEW_CHARS).collect());
        }
        Ok(response) => {
            report.status = HealthStatus::Unhealthy;
            report.http_status = Some(response.status);
            report.error = Some("Non-200 status code".to_string());
        }
        Err(WorkerError::Connect(message)) => {
            report.status = HealthStatus::ConnectionFailed;
            report.error = Some(message);
        }
        Err(WorkerError::Timeout(timeout)) => {
            report.status = HealthStatus::Timeout;
            report.timeout_seconds = Some(timeout.as_secs());
            report.error = Some("Health check timeout".to_string());
        }
        Err(err @ WorkerError::Other(_)) => {
            report.status = HealthStatus::Error;
            report.error = Some(err.to_string());
        }
    }

    report
}
