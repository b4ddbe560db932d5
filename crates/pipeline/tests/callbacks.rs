mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::Harness;
use hoit_db::models::job::JobPatch;
use hoit_db::models::status::{JobStatus, RenderStatus};
use hoit_db::store::{JobStore, RenderJobStore, UsageStore};
use hoit_pipeline::callback::{CallbackOutcome, RenderCallback, TranscriptionCallback};
use hoit_pipeline::error::PipelineError;
use serde_json::json;
use uuid::Uuid;

fn transcription(job_id: Uuid, status: &str) -> TranscriptionCallback {
    TranscriptionCallback {
        job_id,
        status: status.to_string(),
        progress: None,
        message: None,
        result: None,
        error_message: None,
        error_code: None,
    }
}

fn render(job_id: Uuid, status: &str) -> RenderCallback {
    RenderCallback {
        job_id,
        status: status.to_string(),
        progress: None,
        estimated_time_remaining: None,
        download_url: None,
        file_size: None,
        duration: None,
        error_message: None,
        error_code: None,
    }
}

// ---------------------------------------------------------------------------
// Transcription
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_completion_is_applied_once() {
    let h = Harness::new();
    let (queue, workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.transcription_job().await;

    let mut callback = transcription(job.job_id, "completed");
    callback.result = Some(json!({
        "segments": [{"start_time": 0.0, "end_time": 1.5, "text": "hello there", "speaker": "A"}]
    }));

    let first = gateway.handle_transcription(callback.clone()).await.unwrap();
    assert_eq!(first, CallbackOutcome::Received);

    let stored = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(JobStatus::Completed));
    assert_eq!(stored.progress, 100);
    let segment = &stored.result.as_ref().unwrap()["segments"][0];
    assert_eq!(segment["start"], 0.0);
    assert_eq!(segment["end"], 1.5);
    assert!(segment.get("start_time").is_none());

    callback.result = Some(json!({"segments": []}));
    let second = gateway.handle_transcription(callback).await.unwrap();
    assert_eq!(second, CallbackOutcome::AlreadyCompleted);

    let unchanged = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(unchanged.result, stored.result);

    assert!(workers.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn progress_then_failure_keeps_last_progress() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.transcription_job().await;

    let mut progress = transcription(job.job_id, "processing");
    progress.progress = Some(40);
    gateway.handle_transcription(progress).await.unwrap();

    let mut failed = transcription(job.job_id, "failed");
    failed.error_message = Some("decoder crashed".to_string());
    failed.error_code = Some("DECODE_ERROR".to_string());
    assert_eq!(
        gateway.handle_transcription(failed).await.unwrap(),
        CallbackOutcome::Received
    );

    let stored = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(JobStatus::Failed));
    assert_eq!(stored.progress, 40);
    assert_eq!(stored.error_message.as_deref(), Some("decoder crashed"));
    assert_eq!(stored.error_code.as_deref(), Some("DECODE_ERROR"));

    let late = gateway
        .handle_transcription(transcription(job.job_id, "completed"))
        .await
        .unwrap();
    assert_eq!(late, CallbackOutcome::AlreadyFailed);
}

#[tokio::test]
async fn completed_job_ignores_failure() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.transcription_job().await;
    h.store
        .update_job(
            job.job_id,
            &JobPatch {
                status: Some(JobStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = gateway
        .handle_transcription(transcription(job.job_id, "failed"))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyCompleted);
}

#[tokio::test]
async fn unrecognized_status_is_acknowledged_without_change() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.transcription_job().await;

    let outcome = gateway
        .handle_transcription(transcription(job.job_id, "exploded"))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Received);

    let stored = h.store.get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(JobStatus::Processing));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);

    let result = gateway
        .handle_transcription(transcription(Uuid::new_v4(), "completed"))
        .await;
    assert_matches!(result, Err(PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn store_failure_surfaces() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.transcription_job().await;
    h.store.set_fail_writes(true);

    let result = gateway
        .handle_transcription(transcription(job.job_id, "completed"))
        .await;
    assert_matches!(result, Err(PipelineError::Store(_)));
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

#[tokio::test]
async fn render_completion_records_usage_once() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.render_job(Some("u1")).await;

    let mut progress = render(job.job_id, "processing");
    progress.progress = Some(55);
    progress.estimated_time_remaining = Some(12);
    gateway.handle_render(progress).await.unwrap();

    let mut done = render(job.job_id, "completed");
    done.download_url = Some("https://cdn.example.com/out.mp4".to_string());
    done.file_size = Some(2048);
    done.duration = Some(9.5);
    assert_eq!(gateway.handle_render(done.clone()).await.unwrap(), CallbackOutcome::Received);
    assert_eq!(
        gateway.handle_render(done).await.unwrap(),
        CallbackOutcome::AlreadyCompleted
    );

    let stored = h.store.get_render_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(RenderStatus::Completed));
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.file_size, Some(2048));
    assert!(stored.started_at.is_some() && stored.completed_at.is_some());

    let today = chrono::Utc::now().date_naive();
    let usage = h.store.usage_since("u1", today).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].render_count, 1);
    assert_eq!(usage[0].render_success_count, 1);
    assert_eq!(usage[0].total_cues_processed, 2);
}

#[tokio::test]
async fn cancelled_render_absorbs_callbacks() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.render_job(Some("u1")).await;
    assert!(h.store.cancel_render_job(job.job_id).await.unwrap());

    let outcome = gateway.handle_render(render(job.job_id, "completed")).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyCancelled);

    let stored = h.store.get_render_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(RenderStatus::Cancelled));
}

#[tokio::test]
async fn render_failure_records_error_fields() {
    let h = Harness::new();
    let (queue, _workers) = h.start_queue();
    let gateway = h.gateway(queue);
    let job = h.render_job(None).await;

    let mut failed = render(job.job_id, "failed");
    failed.error_message = Some("out of memory".to_string());
    failed.error_code = Some("GPU_OOM".to_string());
    gateway.handle_render(failed).await.unwrap();

    let stored = h.store.get_render_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(RenderStatus::Failed));
    assert_eq!(stored.error_code.as_deref(), Some("GPU_OOM"));
}
