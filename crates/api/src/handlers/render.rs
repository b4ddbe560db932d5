//! Handlers for the render endpoints under `/api/render`.
//!
//! Ownership is enforced through [`Caller`]: a job created with an
//! `X-User-Id` can only be viewed, cancelled or deleted by that user.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use hoit_compute::health::HealthReport;
use hoit_core::error::CoreError;
use hoit_core::estimation::{estimate_render_seconds, extract_video_name, UNTITLED};
use hoit_core::quota::{QuotaDecision, QuotaLimits, QuotaType, QuotaUsage};
use hoit_core::render_request::{validate_render_request, RenderOptions};
use hoit_core::types::{JobId, Timestamp, UserId};
use hoit_db::models::render_job::{CreateRenderJob, RenderJob};
use hoit_db::models::usage_stats::UsageStats;
use hoit_db::repositories::render_job_repo::MAX_LIMIT;
use hoit_pipeline::callback::RenderCallback;
use hoit_pipeline::queue::DispatchTask;
use hoit_pipeline::usage::DEFAULT_USAGE_DAYS;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_job_id;
use crate::handlers::transcription::CallbackResponse;
use crate::handlers::webhook::{self, WebhookKind};
use crate::middleware::identity::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for render history.
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// Longest usage window served.
const MAX_USAGE_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRenderRequest {
    pub video_url: String,
    pub scenario: Value,
    pub options: Option<RenderOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRenderResponse {
    pub job_id: JobId,
    pub estimated_time: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatusResponse {
    pub job_id: JobId,
    pub status: String,
    pub progress: i32,
    pub estimated_time_remaining: Option<i32>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub download_url: Option<String>,
    pub error: Option<String>,
    /// Fresher progress document from the worker, while the job is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_progress: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CancelRenderResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderHistoryItem {
    pub job_id: JobId,
    pub video_name: String,
    pub status: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<f64>,
}

impl From<RenderJob> for RenderHistoryItem {
    fn from(job: RenderJob) -> Self {
        Self {
            job_id: job.job_id,
            video_name: job.video_name.unwrap_or_else(|| UNTITLED.to_string()),
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            download_url: job.download_url,
            file_size: job.file_size,
            duration: job.duration,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

/// One day of render usage.
#[derive(Debug, Serialize)]
pub struct UsageDay {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub render_count: i32,
    pub success_rate: f64,
    pub avg_processing_time: f64,
    pub total_duration: f64,
    pub avg_file_size: f64,
    pub avg_cues_per_job: f64,
}

impl From<UsageStats> for UsageDay {
    fn from(row: UsageStats) -> Self {
        Self {
            success_rate: row.success_rate(),
            user_id: row.user_id,
            date: row.date,
            render_count: row.render_count,
            avg_processing_time: row.avg_processing_time,
            total_duration: row.total_duration,
            avg_file_size: row.avg_file_size,
            avg_cues_per_job: row.avg_cues_per_job,
        }
    }
}

/// The caller's limits and where they stand against them.
#[derive(Debug, Serialize)]
pub struct QuotaSnapshot {
    pub allowed: bool,
    pub limits: QuotaLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<QuotaUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<QuotaUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent: Option<QuotaUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_type: Option<QuotaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a render job and verify the caller may act on it.
async fn find_and_authorize(
    state: &AppState,
    job_id: JobId,
    caller: &Caller,
    action: &str,
) -> AppResult<RenderJob> {
    let job = state
        .render_jobs
        .get_render_job(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Render job",
            id: job_id,
        }))?;
    caller.authorize(job.user_id.as_deref(), action)?;
    Ok(job)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/render/create
///
/// Validate the request, apply the caller's quota, persist the job as
/// `queued` and hand it to the dispatch queue.
pub async fn create_render(
    caller: Caller,
    State(state): State<AppState>,
    Json(input): Json<CreateRenderRequest>,
) -> AppResult<Json<CreateRenderResponse>> {
    let options = input.options.unwrap_or_default();
    validate_render_request(&input.video_url, &input.scenario, &options)
        .map_err(AppError::Validation)?;

    if let Some(user_id) = caller.user_id.as_deref() {
        if let QuotaDecision::Denied { quota_type, reason, usage } =
            state.quota.check(user_id).await?
        {
            return Err(AppError::QuotaExceeded { quota_type, reason, usage });
        }
    }

    let options = serde_json::to_value(&options)
        .map_err(|e| AppError::InternalError(format!("Failed to encode render options: {e}")))?;
    let job = state
        .render_jobs
        .create_render_job(&CreateRenderJob {
            job_id: None,
            user_id: caller.user_id.clone(),
            video_name: Some(extract_video_name(&input.video_url)),
            estimated_time: estimate_render_seconds(&input.scenario),
            video_url: input.video_url,
            scenario: input.scenario,
            options,
        })
        .await?;

    tracing::info!(
        job_id = %job.job_id,
        user_id = ?job.user_id,
        estimated_time = ?job.estimated_time,
        "Render job created",
    );

    let response = CreateRenderResponse {
        job_id: job.job_id,
        estimated_time: job.estimated_time.unwrap_or_default(),
        created_at: job.created_at,
    };
    state.queue.enqueue(DispatchTask::Render(Box::new(job))).await?;

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/render/{job_id}/status
pub async fn render_status(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<RenderStatusResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    let job = find_and_authorize(&state, job_id, &caller, "view").await?;

    let live_progress = match job.status() {
        Some(status) if !status.is_terminal() => state.progress.render_progress(job_id).await,
        _ => None,
    };

    Ok(Json(RenderStatusResponse {
        job_id: job.job_id,
        status: job.status,
        progress: job.progress,
        estimated_time_remaining: job.estimated_time_remaining,
        started_at: job.started_at,
        completed_at: job.completed_at,
        download_url: job.download_url,
        error: job.error_message,
        live_progress,
    }))
}

// ---------------------------------------------------------------------------
// Cancel / delete
// ---------------------------------------------------------------------------

/// POST /api/render/{job_id}/cancel
///
/// Moves a queued or processing job to `cancelled` and queues a stop
/// signal for the GPU worker. A job that already finished reports
/// `success: false`.
pub async fn cancel_render(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<CancelRenderResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    find_and_authorize(&state, job_id, &caller, "cancel").await?;

    if !state.render_jobs.cancel_render_job(job_id).await? {
        return Ok(Json(CancelRenderResponse {
            success: false,
            message: "Failed to cancel job or job is already completed",
        }));
    }

    tracing::info!(%job_id, user_id = ?caller.user_id, "Render job cancelled");
    if let Err(e) = state.queue.enqueue(DispatchTask::CancelRender(job_id)).await {
        tracing::warn!(%job_id, error = %e, "Cancellation signal not queued");
    }

    Ok(Json(CancelRenderResponse {
        success: true,
        message: "Job cancelled successfully",
    }))
}

/// DELETE /api/render/{job_id}
///
/// Remove a finished job. Active jobs must be cancelled first (409).
pub async fn delete_render(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    let job_id = parse_job_id(&raw_id)?;
    let job = find_and_authorize(&state, job_id, &caller, "delete").await?;

    if !job.status().is_some_and(|s| s.is_terminal()) {
        return Err(AppError::Core(CoreError::Conflict(
            "Render job is still active; cancel it before deleting".into(),
        )));
    }

    if !state.render_jobs.delete_render_job(job_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Render job",
            id: job_id,
        }));
    }
    tracing::info!(%job_id, "Render job deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// History, quota, usage
// ---------------------------------------------------------------------------

/// GET /api/render/history?limit=
///
/// The caller's completed and failed jobs, newest first.
pub async fn render_history(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> AppResult<Json<Vec<RenderHistoryItem>>> {
    let user_id = caller.require()?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_LIMIT);

    let jobs = state.render_jobs.render_history(Some(user_id), limit).await?;
    Ok(Json(jobs.into_iter().map(RenderHistoryItem::from).collect()))
}

/// GET /api/render/quota
pub async fn render_quota(
    caller: Caller,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<QuotaSnapshot>>> {
    let user_id = caller.require()?;
    let limits = state.quota.limits_for(user_id).await?;

    let snapshot = match state.quota.check(user_id).await? {
        QuotaDecision::Allowed { daily, monthly, concurrent } => QuotaSnapshot {
            allowed: true,
            limits,
            daily: Some(daily),
            monthly: Some(monthly),
            concurrent: Some(concurrent),
            quota_type: None,
            reason: None,
        },
        QuotaDecision::Denied { quota_type, reason, usage } => QuotaSnapshot {
            allowed: false,
            limits,
            daily: (quota_type == QuotaType::Daily).then_some(usage),
            monthly: (quota_type == QuotaType::Monthly).then_some(usage),
            concurrent: (quota_type == QuotaType::Concurrent).then_some(usage),
            quota_type: Some(quota_type),
            reason: Some(reason),
        },
    };

    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/render/usage?days=
pub async fn render_usage(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> AppResult<Json<DataResponse<Vec<UsageDay>>>> {
    let user_id = caller.require()?;
    let days = params.days.unwrap_or(DEFAULT_USAGE_DAYS).clamp(1, MAX_USAGE_DAYS);

    let rows = state.usage.daily_usage(user_id, days).await?;
    Ok(Json(DataResponse {
        data: rows.into_iter().map(UsageDay::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Worker callback and health
// ---------------------------------------------------------------------------

/// POST /api/render/callback
///
/// GPU worker webhook. Cancelled jobs answer `already_cancelled`.
pub async fn render_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<CallbackResponse>> {
    webhook::authenticate(state.config.webhook_secret.as_deref(), &headers, &body)?;
    let callback: RenderCallback = webhook::decode(WebhookKind::Render, &headers, &body)?;

    let status = state.callbacks.handle_render(callback).await?;
    Ok(Json(CallbackResponse { status }))
}

/// GET /api/render/gpu-server/health
pub async fn gpu_server_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.dispatcher.gpu().health().await)
}
