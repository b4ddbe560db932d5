//! Per-user daily render usage.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use hoit_core::scenario::cue_count;
use hoit_db::models::render_job::RenderJob;
use hoit_db::models::status::RenderStatus;
use hoit_db::models::usage_stats::{UsageDelta, UsageStats};
use hoit_db::store::{StoreError, UsageStore};

/// Default window for the usage read API, in days.
pub const DEFAULT_USAGE_DAYS: i64 = 30;

/// Folds finished render jobs into `render_usage_stats`.
///
/// Callers invoke [`record`](Self::record) once per job, on the job's first
/// transition into `completed` or `failed`; the conditional status update
/// upstream guarantees that transition happens at most once.
#[derive(Clone)]
pub struct UsageAccumulator {
    usage: Arc<dyn UsageStore>,
}

impl UsageAccumulator {
    pub fn new(usage: Arc<dyn UsageStore>) -> Self {
        Self { usage }
    }

    /// Record a finished job. Returns `None` for anonymous or non-finished
    /// jobs, which are not counted.
    pub async fn record(&self, job: &RenderJob) -> Result<Option<UsageStats>, StoreError> {
        let Some(user_id) = job.user_id.as_deref() else {
            return Ok(None);
        };
        let delta = match job.status() {
            Some(RenderStatus::Completed) => UsageDelta {
                succeeded: true,
                duration: job.duration.unwrap_or_default(),
                processing_time: job.processing_secs().unwrap_or_default(),
                file_size: job.file_size.unwrap_or_default(),
                cues: cue_count(&job.scenario),
            },
            Some(RenderStatus::Failed) => UsageDelta::failure(),
            _ => return Ok(None),
        };

        let date = job.completed_at.unwrap_or_else(Utc::now).date_naive();
        let stats = self.usage.record_usage(user_id, date, &delta).await?;
        tracing::debug!(
            job_id = %job.job_id,
            user_id,
            %date,
            render_count = stats.render_count,
            "Render usage recorded",
        );
        Ok(Some(stats))
    }

    /// [`record`](Self::record), logging instead of returning a failure.
    /// Used after the job's terminal transition has already committed.
    pub async fn record_logged(&self, job: &RenderJob) {
        if let Err(e) = self.record(job).await {
            tracing::error!(job_id = %job.job_id, error = %e, "Failed to record render usage");
        }
    }

    /// Daily rows for the last `days` days (today included), newest first.
    pub async fn daily_usage(
        &self,
        user_id: &str,
        days: i64,
    ) -> Result<Vec<UsageStats>, StoreError> {
        let since = usage_window_start(Utc::now().date_naive(), days);
        self.usage.usage_since(user_id, since).await
    }
}

fn usage_window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.max(1) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoit_db::memory::MemoryStore;
    use hoit_db::models::render_job::{CreateRenderJob, RenderJobPatch};
    use hoit_db::store::RenderJobStore;
    use serde_json::json;

    async fn finished_job(
        store: &MemoryStore,
        user: Option<&str>,
        status: RenderStatus,
    ) -> RenderJob {
        let job = store
            .create_render_job(&CreateRenderJob {
                job_id: None,
                user_id: user.map(str::to_string),
                video_url: "https://cdn.example.com/a.mp4".into(),
                video_name: None,
                scenario: json!({"version": "1.0", "cues": [{"id": "a"}, {"id": "b"}]}),
                options: json!({}),
                estimated_time: 40,
            })
            .await
            .unwrap();
        let patch = RenderJobPatch {
            status: Some(status),
            file_size: Some(1000),
            duration: Some(12.5),
            ..Default::default()
        };
        store
            .update_render_job_if_status(job.job_id, RenderStatus::ACTIVE, &patch)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn success_adds_totals_and_cues() {
        let store = Arc::new(MemoryStore::new());
        let usage = UsageAccumulator::new(store.clone());

        let job = finished_job(&store, Some("u1"), RenderStatus::Completed).await;
        let stats = usage.record(&job).await.unwrap().unwrap();

        assert_eq!(stats.render_count, 1);
        assert_eq!(stats.render_success_count, 1);
        assert_eq!(stats.total_file_size, 1000);
        assert_eq!(stats.total_cues_processed, 2);
        assert_eq!(stats.avg_cues_per_job, 2.0);
        assert_eq!(stats.total_duration, 12.5);
    }

    #[tokio::test]
    async fn failure_only_bumps_counters() {
        let store = Arc::new(MemoryStore::new());
        let usage = UsageAccumulator::new(store.clone());

        let ok = finished_job(&store, Some("u1"), RenderStatus::Completed).await;
        let failed = finished_job(&store, Some("u1"), RenderStatus::Failed).await;
        usage.record(&ok).await.unwrap();
        let stats = usage.record(&failed).await.unwrap().unwrap();

        assert_eq!(stats.render_count, 2);
        assert_eq!(stats.render_failed_count, 1);
        assert_eq!(stats.total_file_size, 1000);
        assert_eq!(stats.success_rate(), 0.5);
    }

    #[tokio::test]
    async fn anonymous_jobs_are_not_counted() {
        let store = Arc::new(MemoryStore::new());
        let usage = UsageAccumulator::new(store.clone());

        let job = finished_job(&store, None, RenderStatus::Completed).await;
        assert!(usage.record(&job).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn daily_usage_reads_back_recorded_rows() {
        let store = Arc::new(MemoryStore::new());
        let usage = UsageAccumulator::new(store.clone());
        let job = finished_job(&store, Some("u1"), RenderStatus::Completed).await;
        usage.record(&job).await.unwrap();

        let rows = usage.daily_usage("u1", DEFAULT_USAGE_DAYS).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(usage.daily_usage("u2", 7).await.unwrap().is_empty());
    }

    #[test]
    fn window_includes_today() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(usage_window_start(today, 1), today);
        assert_eq!(
            usage_window_start(today, 30),
            NaiveDate::from_ymd_opt(2025, 2, 9).unwrap()
        );
        assert_eq!(usage_window_start(today, 0), today);
    }
}
