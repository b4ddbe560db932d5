//! Worker webhook handling.
//!
//! Workers may deliver the same callback more than once and in any order.
//! Each delivery is classified against the job's current status (see
//! [`decide_transcription`] and [`decide_render`]) and applied with a
//! conditional update keyed on the status that was read, so two racing
//! deliveries cannot both win. A lost race re-reads and re-decides.

use std::sync::Arc;

use hoit_core::normalize::normalize_timestamp_fields;
use hoit_core::types::JobId;
use hoit_db::models::job::{Job, JobPatch};
use hoit_db::models::render_job::{RenderJob, RenderJobPatch};
use hoit_db::models::status::{JobStatus, RenderStatus};
use hoit_db::store::{JobStore, RenderJobStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::queue::{DispatchQueue, DispatchTask};
use crate::usage::UsageAccumulator;

/// Re-reads allowed when the status changes between read and write.
const MAX_APPLY_ATTEMPTS: usize = 3;

/// ML worker webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionCallback {
    pub job_id: JobId,
    pub status: String,
    pub progress: Option<i32>,
    pub message: Option<String>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

/// GPU worker webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderCallback {
    pub job_id: JobId,
    pub status: String,
    pub progress: Option<i32>,
    pub estimated_time_remaining: Option<i32>,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<f64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

/// What the gateway reports back to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Received,
    AlreadyCompleted,
    AlreadyFailed,
    AlreadyCancelled,
}

impl CallbackOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::AlreadyCompleted => "already_completed",
            Self::AlreadyFailed => "already_failed",
            Self::AlreadyCancelled => "already_cancelled",
        }
    }
}

/// Action for one (current status, incoming status) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Leave the job untouched and answer with the outcome.
    Noop(CallbackOutcome),
    /// Incoming status is not one a worker should send; ignore it.
    Unrecognized,
    /// Record progress, moving the job to `processing`.
    Progress,
    Complete,
    Fail,
}

/// Idempotency table for transcription jobs.
///
/// A terminal job never changes again: a failed job answers
/// `already_failed` to anything, a completed job `already_completed` to
/// any known status.
pub fn decide_transcription(current: JobStatus, incoming: &str) -> Transition {
    if current == JobStatus::Failed {
        return Transition::Noop(CallbackOutcome::AlreadyFailed);
    }
    let Some(incoming) = JobStatus::parse(incoming) else {
        return Transition::Unrecognized;
    };
    if current == JobStatus::Completed {
        return Transition::Noop(CallbackOutcome::AlreadyCompleted);
    }
    match incoming {
        JobStatus::Processing => Transition::Progress,
        JobStatus::Completed => Transition::Complete,
        JobStatus::Failed => Transition::Fail,
        JobStatus::Pending => Transition::Unrecognized,
    }
}

/// Idempotency table for render jobs; as for transcription, plus
/// `cancelled` which absorbs every later callback.
pub fn decide_render(current: RenderStatus, incoming: &str) -> Transition {
    match current {
        RenderStatus::Cancelled => return Transition::Noop(CallbackOutcome::AlreadyCancelled),
        RenderStatus::Failed => return Transition::Noop(CallbackOutcome::AlreadyFailed),
        _ => {}
    }
    let Some(incoming) = RenderStatus::parse(incoming) else {
        return Transition::Unrecognized;
    };
    if current == RenderStatus::Completed {
        return Transition::Noop(CallbackOutcome::AlreadyCompleted);
    }
    match incoming {
        RenderStatus::Processing => Transition::Progress,
        RenderStatus::Completed => Transition::Complete,
        RenderStatus::Failed => Transition::Fail,
        RenderStatus::Queued | RenderStatus::Cancelled => Transition::Unrecognized,
    }
}

fn clamp_progress(progress: Option<i32>) -> Option<i32> {
    progress.map(|p| p.clamp(0, 100))
}

/// Applies worker callbacks to the stores.
#[derive(Clone)]
pub struct CallbackGateway {
    jobs: Arc<dyn JobStore>,
    render_jobs: Arc<dyn RenderJobStore>,
    usage: UsageAccumulator,
    queue: DispatchQueue,
}

impl CallbackGateway {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        render_jobs: Arc<dyn RenderJobStore>,
        usage: UsageAccumulator,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            jobs,
            render_jobs,
            usage,
            queue,
        }
    }

    // -----------------------------------------------------------------------
    // Transcription
    // -----------------------------------------------------------------------

    pub async fn handle_transcription(
        &self,
        callback: TranscriptionCallback,
    ) -> Result<CallbackOutcome, PipelineError> {
        let job_id = callback.job_id;
        let result = callback.result.as_ref().map(normalize_timestamp_fields);
        tracing::info!(%job_id, status = %callback.status, progress = ?callback.progress, "Transcription callback received");

        for _ in 0..MAX_APPLY_ATTEMPTS {
            let job = self.load_job(job_id).await?;
            let Some(current) = job.status() else {
                tracing::warn!(%job_id, stored = %job.status, "Job has an unknown stored status, ignoring callback");
                return Ok(CallbackOutcome::Received);
            };

            let transition = decide_transcription(current, &callback.status);
            let patch = match transition {
                Transition::Noop(outcome) => {
                    tracing::info!(%job_id, current = %current, incoming = %callback.status, outcome = outcome.as_str(), "Duplicate callback ignored");
                    return Ok(outcome);
                }
                Transition::Unrecognized => {
                    tracing::warn!(%job_id, incoming = %callback.status, "Unrecognized callback status ignored");
                    return Ok(CallbackOutcome::Received);
                }
                Transition::Progress => JobPatch {
                    status: Some(JobStatus::Processing),
                    progress: clamp_progress(callback.progress),
                    ..Default::default()
                },
                Transition::Complete => JobPatch {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    result: result.clone(),
                    ..Default::default()
                },
                Transition::Fail => JobPatch {
                    status: Some(JobStatus::Failed),
                    error_message: callback
                        .error_message
                        .clone()
                        .or_else(|| callback.message.clone()),
                    error_code: callback.error_code.clone(),
                    ..Default::default()
                },
            };

            if self.jobs.update_job_if_status(job_id, &[current], &patch).await? {
                if transition == Transition::Complete {
                    self.after_transcription_complete(job_id, result.is_some()).await;
                }
                return Ok(CallbackOutcome::Received);
            }
            tracing::debug!(%job_id, "Job status changed during callback, re-reading");
        }

        Err(PipelineError::Contended(job_id))
    }

    async fn load_job(&self, job_id: JobId) -> Result<Job, PipelineError> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::NotFound { entity: "Job", id: job_id })
    }

    async fn after_transcription_complete(&self, job_id: JobId, has_result: bool) {
        tracing::info!(%job_id, "Transcription completed");
        if !has_result {
            return;
        }
        if let Err(e) = self.queue.enqueue(DispatchTask::PostProcess(job_id)).await {
            tracing::error!(%job_id, error = %e, "Failed to schedule post-processing");
        }
    }

    // -----------------------------------------------------------------------
    // Render
    // -----------------------------------------------------------------------

    pub async fn handle_render(
        &self,
        callback: RenderCallback,
    ) -> Result<CallbackOutcome, PipelineError> {
        let job_id = callback.job_id;
        tracing::info!(%job_id, status = %callback.status, progress = ?callback.progress, "Render callback received");

        for _ in 0..MAX_APPLY_ATTEMPTS {
            let job = self.load_render_job(job_id).await?;
            let Some(current) = job.status() else {
                tracing::warn!(%job_id, stored = %job.status, "Render job has an unknown stored status, ignoring callback");
                return Ok(CallbackOutcome::Received);
            };

            let patch = match decide_render(current, &callback.status) {
                Transition::Noop(outcome) => {
                    tracing::info!(%job_id, current = %current, incoming = %callback.status, outcome = outcome.as_str(), "Duplicate callback ignored");
                    return Ok(outcome);
                }
                Transition::Unrecognized => {
                    tracing::warn!(%job_id, incoming = %callback.status, "Unrecognized callback status ignored");
                    return Ok(CallbackOutcome::Received);
                }
                Transition::Progress => RenderJobPatch {
                    status: Some(RenderStatus::Processing),
                    progress: clamp_progress(callback.progress),
                    estimated_time_remaining: callback.estimated_time_remaining,
                    ..Default::default()
                },
                Transition::Complete => RenderJobPatch {
                    status: Some(RenderStatus::Completed),
                    progress: Some(100),
                    estimated_time_remaining: Some(0),
                    download_url: callback.download_url.clone(),
                    file_size: callback.file_size,
                    duration: callback.duration,
                    ..Default::default()
                },
                Transition::Fail => RenderJobPatch {
                    status: Some(RenderStatus::Failed),
                    error_message: callback.error_message.clone(),
                    error_code: callback.error_code.clone(),
                    ..Default::default()
                },
            };

            if let Some(row) = self
                .render_jobs
                .update_render_job_if_status(job_id, &[current], &patch)
                .await?
            {
                if let Some(status) = row.status().filter(|s| s.is_terminal()) {
                    tracing::info!(%job_id, status = %status, "Render job finished");
                    self.usage.record_logged(&row).await;
                }
                return Ok(CallbackOutcome::Received);
            }
            tracing::debug!(%job_id, "Render job status changed during callback, re-reading");
        }

        Err(PipelineError::Contended(job_id))
    }

    async fn load_render_job(&self, job_id: JobId) -> Result<RenderJob, PipelineError> {
        self.render_jobs
            .get_render_job(job_id)
            .await?
            .ok_or(PipelineError::NotFound { entity: "Render job", id: job_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_transcription_absorbs_known_statuses() {
        for incoming in ["completed", "processing", "failed", "pending"] {
            assert_eq!(
                decide_transcription(JobStatus::Completed, incoming),
                Transition::Noop(CallbackOutcome::AlreadyCompleted),
                "incoming {incoming}",
            );
        }
        assert_eq!(decide_transcription(JobStatus::Completed, "bogus"), Transition::Unrecognized);
    }

    #[test]
    fn failed_transcription_absorbs_everything() {
        for incoming in ["completed", "processing", "failed", "bogus"] {
            assert_eq!(
                decide_transcription(JobStatus::Failed, incoming),
                Transition::Noop(CallbackOutcome::AlreadyFailed),
            );
        }
    }

    #[test]
    fn active_transcription_follows_incoming_status() {
        for current in [JobStatus::Pending, JobStatus::Processing] {
            assert_eq!(decide_transcription(current, "processing"), Transition::Progress);
            assert_eq!(decide_transcription(current, "completed"), Transition::Complete);
            assert_eq!(decide_transcription(current, "failed"), Transition::Fail);
            assert_eq!(decide_transcription(current, "done"), Transition::Unrecognized);
        }
    }

    #[test]
    fn cancelled_render_absorbs_everything() {
        for incoming in ["completed", "processing", "failed", "bogus"] {
            assert_eq!(
                decide_render(RenderStatus::Cancelled, incoming),
                Transition::Noop(CallbackOutcome::AlreadyCancelled),
            );
        }
    }

    #[test]
    fn render_table() {
        assert_eq!(decide_render(RenderStatus::Queued, "processing"), Transition::Progress);
        assert_eq!(decide_render(RenderStatus::Processing, "completed"), Transition::Complete);
        assert_eq!(decide_render(RenderStatus::Queued, "failed"), Transition::Fail);
        assert_eq!(decide_render(RenderStatus::Processing, "queued"), Transition::Unrecognized);
        assert_eq!(
            decide_render(RenderStatus::Completed, "failed"),
            Transition::Noop(CallbackOutcome::AlreadyCompleted),
        );
        assert_eq!(
            decide_render(RenderStatus::Failed, "completed"),
            Transition::Noop(CallbackOutcome::AlreadyFailed),
        );
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(Some(150)), Some(100));
        assert_eq!(clamp_progress(Some(-3)), Some(0));
        assert_eq!(clamp_progress(None), None);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_value(CallbackOutcome::AlreadyCancelled).unwrap();
        assert_eq!(json, "already_cancelled");
    }
}
