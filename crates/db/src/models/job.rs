//! Transcription job rows.

use hoit_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: String,
    pub progress: i32,
    pub video_url: Option<String>,
    pub file_key: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Typed status; `None` for a value outside the known set.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// Input for inserting a job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    /// Generated when absent.
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    pub progress: i32,
    pub video_url: Option<String>,
    pub file_key: Option<String>,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<i32>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
}
