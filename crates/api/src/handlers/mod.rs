pub mod render;
pub mod transcription;
pub mod webhook;

use hoit_core::types::JobId;

use crate::error::AppError;

/// Parse a job id path segment. Placeholder values that front-ends send
/// before a job exists (`undefined`, `null`, empty) get a specific message.
pub fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "undefined" || raw == "null" {
        return Err(AppError::BadRequest("A valid job id is required".into()));
    }
    JobId::parse_str(raw).map_err(|_| AppError::BadRequest("Job id must be a valid UUID".into()))
}
