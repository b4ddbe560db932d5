//! Hands jobs to the external workers and records dispatch failures.
//!
//! Success only means the worker accepted the job; results arrive later on
//! the callback endpoints. Every failure branch writes the job's error state
//! before returning, and those writes only apply while the job is still
//! active so a late failure never overwrites a callback's terminal state.

use std::sync::Arc;

use hoit_compute::gpu::{GpuRenderApi, RenderRequest};
use hoit_compute::ml::{MlServerApi, ProcessVideoRequest};
use hoit_compute::transport::{WorkerError, WorkerResponse};
use hoit_core::transcript::{is_placeholder_transcript, summarize};
use hoit_core::types::JobId;
use hoit_db::models::job::JobPatch;
use hoit_db::models::render_job::{RenderJob, RenderJobPatch};
use hoit_db::models::status::{JobStatus, RenderStatus};
use hoit_db::store::{JobStore, RenderJobStore};
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::queue::DispatchTask;
use crate::retry::RetryPolicy;
use crate::usage::UsageAccumulator;

/// Failure codes recorded on jobs.
pub mod codes {
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
    pub const ML_SERVER_ERROR: &str = "ML_SERVER_ERROR";
    /// The task never reached a worker (queue closed or shut down first).
    pub const DISPATCH_UNAVAILABLE: &str = "DISPATCH_UNAVAILABLE";

    /// `GPU_SERVER_<status>` for a non-200 render submission.
    pub fn gpu_server(status: u16) -> String {
        format!("GPU_SERVER_{status}")
    }
}

/// Sends work to the ML and GPU workers.
pub struct Dispatcher {
    jobs: Arc<dyn JobStore>,
    render_jobs: Arc<dyn RenderJobStore>,
    usage: UsageAccumulator,
    ml: MlServerApi,
    gpu: GpuRenderApi,
    retry: RetryPolicy,
    render_callback_url: String,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        render_jobs: Arc<dyn RenderJobStore>,
        usage: UsageAccumulator,
        ml: MlServerApi,
        gpu: GpuRenderApi,
        retry: RetryPolicy,
        render_callback_url: String,
    ) -> Self {
        Self {
            jobs,
            render_jobs,
            usage,
            ml,
            gpu,
            retry,
            render_callback_url,
        }
    }

    pub fn ml(&self) -> &MlServerApi {
        &self.ml
    }

    pub fn gpu(&self) -> &GpuRenderApi {
        &self.gpu
    }

    // -----------------------------------------------------------------------
    // Transcription
    // -----------------------------------------------------------------------

    /// Submit a transcription job to the ML worker.
    pub async fn dispatch_transcription(
        &self,
        request: &ProcessVideoRequest,
    ) -> Result<(), PipelineError> {
        let job_id = request.job_id;
        tracing::info!(%job_id, ml_server = self.ml.base_url(), "Sending transcription request");

        let started = Instant::now();
        let outcome = self
            .retry
            .run(job_id, |_| self.ml.process_video(request))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (code, message) = match outcome {
            Ok(response) if response.status == 200 => {
                if response.json().is_some_and(|body| is_placeholder_transcript(&body)) {
                    tracing::warn!(
                        %job_id,
                        elapsed_ms,
                        "ML worker returned placeholder test output instead of a real analysis",
                    );
                }
                tracing::info!(%job_id, elapsed_ms, "Transcription request accepted");
                return Ok(());
            }
            Ok(response) => {
                let fallback = format!("ML Server returned {}", response.status);
                let (message, code) = rejection_detail(&response, fallback);
                (code.unwrap_or_else(|| codes::ML_SERVER_ERROR.to_string()), message)
            }
            Err(e) => transport_failure("ML server", e),
        };

        tracing::error!(%job_id, code = %code, error = %message, elapsed_ms, "Transcription dispatch failed");
        self.fail_transcription(job_id, &code, &message).await?;
        Err(PipelineError::Dispatch { code, message })
    }

    async fn fail_transcription(
        &self,
        job_id: JobId,
        code: &str,
        message: &str,
    ) -> Result<(), PipelineError> {
        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            error_message: Some(format!("{code}: {message}")),
            error_code: Some(code.to_string()),
            ..Default::default()
        };
        let applied = self
            .jobs
            .update_job_if_status(job_id, JobStatus::ACTIVE, &patch)
            .await?;
        if !applied {
            tracing::info!(%job_id, code, "Job already terminal, dispatch failure not recorded");
        }
        Ok(())
    }

    /// Log summary counts for a completed transcription.
    pub async fn post_process_transcription(&self, job_id: JobId) -> Result<(), PipelineError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::NotFound { entity: "Job", id: job_id })?;
        let Some(result) = job.result.as_ref() else {
            tracing::debug!(%job_id, "No result to post-process");
            return Ok(());
        };

        let summary = summarize(result);
        tracing::info!(
            %job_id,
            segments = summary.segment_count,
            words = summary.word_count,
            speakers = summary.speaker_count,
            "Transcription post-processing complete",
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Render
    // -----------------------------------------------------------------------

    /// Submit a render job to the GPU worker. On acceptance the job moves
    /// from `queued` to `processing`.
    pub async fn dispatch_render(&self, job: &RenderJob) -> Result<(), PipelineError> {
        let job_id = job.job_id;
        let request = RenderRequest {
            job_id,
            video_url: job.video_url.clone(),
            scenario: job.scenario.clone(),
            options: job.options.clone(),
            callback_url: self.render_callback_url.clone(),
        };
        tracing::info!(%job_id, gpu_server = self.gpu.base_url(), "Sending render request");

        let outcome = self.retry.run(job_id, |_| self.gpu.render(&request)).await;

        let (code, message) = match outcome {
            Ok(response) if response.status == 200 => {
                let patch = RenderJobPatch {
                    status: Some(RenderStatus::Processing),
                    ..Default::default()
                };
                let moved = self
                    .render_jobs
                    .update_render_job_if_status(job_id, &[RenderStatus::Queued], &patch)
                    .await?;
                if moved.is_none() {
                    tracing::debug!(%job_id, "Render job left queued before acceptance was recorded");
                }
                tracing::info!(%job_id, "Render request accepted");
                return Ok(());
            }
            Ok(response) => {
                let fallback = format!("GPU server returned {}", response.status);
                let (message, _) = rejection_detail(&response, fallback);
                (codes::gpu_server(response.status), message)
            }
            Err(e) => transport_failure("GPU server", e),
        };

        tracing::error!(%job_id, code = %code, error = %message, "Render dispatch failed");
        self.fail_render(job_id, &code, &message).await?;
        Err(PipelineError::Dispatch { code, message })
    }

    async fn fail_render(&self, job_id: JobId, code: &str, message: &str) -> Result<(), PipelineError> {
        let patch = RenderJobPatch {
            status: Some(RenderStatus::Failed),
            error_message: Some(message.to_string()),
            error_code: Some(code.to_string()),
            ..Default::default()
        };
        match self
            .render_jobs
            .update_render_job_if_status(job_id, RenderStatus::ACTIVE, &patch)
            .await?
        {
            Some(row) => self.usage.record_logged(&row).await,
            None => {
                tracing::info!(%job_id, code, "Render job already terminal, dispatch failure not recorded");
            }
        }
        Ok(())
    }

    /// Fail a job whose dispatch task will never run, so it stops counting
    /// as active. Terminal jobs are left alone. Tasks that do not own a job
    /// lifecycle are ignored.
    pub async fn abandon(&self, task: &DispatchTask, message: &str) -> Result<(), PipelineError> {
        match task {
            DispatchTask::Transcribe(request) => {
                self.fail_transcription(request.job_id, codes::DISPATCH_UNAVAILABLE, message)
                    .await
            }
            DispatchTask::Render(job) => {
                self.fail_render(job.job_id, codes::DISPATCH_UNAVAILABLE, message)
                    .await
            }
            DispatchTask::CancelRender(_) | DispatchTask::PostProcess(_) => Ok(()),
        }
    }

    /// Best-effort request to the GPU worker to stop a render. Failures are
    /// logged only; the job is already `cancelled` in the store.
    pub async fn send_render_cancel(&self, job_id: JobId) {
        match self.gpu.cancel(job_id).await {
            Ok(response) if response.status == 200 => {
                tracing::info!(%job_id, "GPU worker acknowledged cancellation");
            }
            Ok(response) => {
                tracing::warn!(%job_id, status = response.status, "GPU worker refused cancellation");
            }
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Cancellation signal not delivered");
            }
        }
    }
}

/// `(message, error.code)` from a rejected request's body. Falls back to the
/// raw body, then to `fallback`, for the message.
fn rejection_detail(response: &WorkerResponse, fallback: String) -> (String, Option<String>) {
    match response.json() {
        Some(body) => {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .map_or(fallback, str::to_string);
            let code = body
                .pointer("/error/code")
                .and_then(|c| c.as_str())
                .map(str::to_string);
            (message, code)
        }
        None if !response.body.trim().is_empty() => (response.body.clone(), None),
        None => (fallback, None),
    }
}

/// Failure code and message for a transport error that survived retries.
fn transport_failure(target: &str, error: WorkerError) -> (String, String) {
    match error {
        WorkerError::Connect(detail) => (
            codes::CONNECTION_ERROR.to_string(),
            format!("{target} connection failed: {detail}"),
        ),
        WorkerError::Timeout(timeout) => (
            codes::TIMEOUT_ERROR.to_string(),
            format!("{target} timed out after {}s", timeout.as_secs()),
        ),
        WorkerError::Other(detail) => (codes::UNKNOWN_ERROR.to_string(), detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_prefers_json_message_and_code() {
        let response = WorkerResponse::new(
            422,
            r#"{"message": "bad video", "error": {"code": "INVALID_VIDEO"}}"#,
        );
        let (message, code) = rejection_detail(&response, "fallback".to_string());
        assert_eq!(message, "bad video");
        assert_eq!(code.as_deref(), Some("INVALID_VIDEO"));
    }

    #[test]
    fn rejection_falls_back_to_raw_body_then_default() {
        let (message, code) =
            rejection_detail(&WorkerResponse::new(502, "Bad Gateway"), "fallback".to_string());
        assert_eq!(message, "Bad Gateway");
        assert!(code.is_none());

        let (message, _) = rejection_detail(&WorkerResponse::new(500, ""), "fallback".to_string());
        assert_eq!(message, "fallback");

        let (message, _) = rejection_detail(&WorkerResponse::new(500, "{}"), "fallback".to_string());
        assert_eq!(message, "fallback");
    }

    #[test]
    fn gpu_code_embeds_status() {
        assert_eq!(codes::gpu_server(503), "GPU_SERVER_503");
    }
}
