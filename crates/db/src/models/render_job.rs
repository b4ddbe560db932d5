//! Render job rows.

use hoit_core::types::{JobId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

use super::status::RenderStatus;

/// A row from the `render_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderJob {
    pub job_id: JobId,
    pub user_id: Option<UserId>,
    pub status: String,
    pub progress: i32,
    pub video_url: String,
    pub video_name: Option<String>,
    pub scenario: serde_json::Value,
    pub options: serde_json::Value,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<f64>,
    pub estimated_time: Option<i32>,
    pub estimated_time_remaining: Option<i32>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl RenderJob {
    /// Typed status; `None` for a value outside the known set.
    pub fn status(&self) -> Option<RenderStatus> {
        RenderStatus::parse(&self.status)
    }

    /// Seconds between start and completion, when both are recorded.
    pub fn processing_secs(&self) -> Option<f64> {
        let (started, completed) = (self.started_at?, self.completed_at?);
        Some((completed - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Input for inserting a render job. The job always starts `queued`.
#[derive(Debug, Clone)]
pub struct CreateRenderJob {
    /// Generated when absent.
    pub job_id: Option<JobId>,
    pub user_id: Option<UserId>,
    pub video_url: String,
    pub video_name: Option<String>,
    pub scenario: serde_json::Value,
    pub options: serde_json::Value,
    pub estimated_time: i32,
}

/// Partial update. `None` fields are left untouched.
///
/// `started_at` and `completed_at` are not patchable: the store stamps
/// them on the first transition into `processing` and into a terminal
/// status respectively.
#[derive(Debug, Clone, Default)]
pub struct RenderJobPatch {
    pub status: Option<RenderStatus>,
    pub progress: Option<i32>,
    pub estimated_time_remaining: Option<i32>,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<f64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

/// Filter for listing render jobs.
#[derive(Debug, Clone, Default)]
pub struct RenderJobListFilter {
    pub user_id: Option<UserId>,
    pub status: Option<RenderStatus>,
}
