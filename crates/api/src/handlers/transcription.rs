//! Handlers for the transcription endpoints under `/api/upload-video`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use hoit_compute::health::HealthReport;
use hoit_compute::ml::{ProcessVideoRequest, AUTO_LANGUAGE};
use hoit_core::error::CoreError;
use hoit_core::types::JobId;
use hoit_db::models::job::CreateJob;
use hoit_db::models::status::JobStatus;
use hoit_pipeline::callback::{CallbackOutcome, TranscriptionCallback};
use hoit_pipeline::queue::DispatchTask;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_job_id;
use crate::handlers::webhook::{self, WebhookKind};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    pub file_key: String,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub job_id: JobId,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: CallbackOutcome,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: String,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Request processing
// ---------------------------------------------------------------------------

/// POST /api/upload-video/request-process
///
/// Create a transcription job for an uploaded object and queue it for the
/// ML worker. Returns immediately; clients poll the status endpoint.
pub async fn request_process(
    State(state): State<AppState>,
    Json(input): Json<ProcessRequest>,
) -> AppResult<Json<ProcessResponse>> {
    let file_key = input.file_key.trim();
    if file_key.is_empty() {
        return Err(AppError::BadRequest("fileKey is required".into()));
    }

    let video_url = state.config.s3_object_url(file_key);
    let job = state
        .jobs
        .create_job(&CreateJob {
            job_id: None,
            status: JobStatus::Processing,
            progress: 0,
            video_url: Some(video_url.clone()),
            file_key: Some(file_key.to_string()),
        })
        .await?;
    tracing::info!(job_id = %job.job_id, file_key, "Transcription job created");

    let language = input
        .language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| AUTO_LANGUAGE.to_string());
    state
        .queue
        .enqueue(DispatchTask::Transcribe(ProcessVideoRequest {
            job_id: job.job_id,
            video_url,
            fastapi_base_url: state.config.public_base_url.clone(),
            language,
        }))
        .await?;

    Ok(Json(ProcessResponse {
        job_id: job.job_id,
        message: "Video processing started.",
    }))
}

// ---------------------------------------------------------------------------
// Worker callback
// ---------------------------------------------------------------------------

/// POST /api/upload-video/result
///
/// ML worker webhook. Duplicate and out-of-order deliveries are answered
/// with `already_completed` / `already_failed` and change nothing.
pub async fn receive_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<CallbackResponse>> {
    webhook::authenticate(state.config.webhook_secret.as_deref(), &headers, &body)?;
    let callback: TranscriptionCallback =
        webhook::decode(WebhookKind::Transcription, &headers, &body)?;

    let status = state.callbacks.handle_transcription(callback).await?;
    Ok(Json(CallbackResponse { status }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/upload-video/status/{job_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    let job = state
        .jobs
        .get_job(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Job", id: job_id }))?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: job.status,
        progress: job.progress,
        result: job.result,
        error_message: job.error_message,
        error_code: job.error_code,
    }))
}

/// GET /api/upload-video/ml-server/health
pub async fn ml_server_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.dispatcher.ml().health().await)
}
