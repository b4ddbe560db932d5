//! In-memory implementation of the store traits for tests.
//!
//! Mirrors the Postgres semantics that callers rely on: conditional updates,
//! lifecycle timestamp stamping, quota counting and the usage upsert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use hoit_core::quota::QuotaCounts;
use hoit_core::types::{JobId, Timestamp, UserId};

use crate::models::job::{CreateJob, Job, JobListFilter, JobPatch};
use crate::models::render_job::{CreateRenderJob, RenderJob, RenderJobListFilter, RenderJobPatch};
use crate::models::render_limits::RenderLimits;
use crate::models::status::{JobStatus, RenderStatus};
use crate::models::usage_stats::{UsageDelta, UsageStats};
use crate::repositories::render_job_repo::MAX_LIMIT;
use crate::store::{
    JobStore, RenderJobStore, RenderLimitStore, StoreError, StoreHealth, UsageStore,
};

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    render_jobs: Mutex<HashMap<JobId, RenderJob>>,
    usage: Mutex<HashMap<(UserId, NaiveDate), UsageStats>>,
    limits: Mutex<HashMap<UserId, RenderLimits>>,
    next_usage_id: AtomicI64,
    fail_writes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Install a per-user limit override.
    pub fn set_render_limits(
        &self,
        user_id: &str,
        daily: Option<i32>,
        monthly: Option<i32>,
        concurrent: Option<i32>,
    ) {
        lock(&self.limits).insert(
            user_id.to_string(),
            RenderLimits {
                user_id: user_id.to_string(),
                daily_limit: daily,
                monthly_limit: monthly,
                concurrent_limit: concurrent,
                updated_at: Utc::now(),
            },
        );
    }

    /// Rewrite a render job's `created_at`, for quota window tests.
    pub fn backdate_render_job(&self, job_id: JobId, created_at: Timestamp) {
        if let Some(job) = lock(&self.render_jobs).get_mut(&job_id) {
            job.created_at = created_at;
        }
    }

    /// Rewrite a render job's `started_at`, for processing-time tests.
    pub fn set_render_started_at(&self, job_id: JobId, started_at: Option<Timestamp>) {
        if let Some(job) = lock(&self.render_jobs).get_mut(&job_id) {
            job.started_at = started_at;
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

fn apply_job_patch(job: &mut Job, patch: &JobPatch) {
    if let Some(status) = patch.status {
        job.status = status.as_str().to_string();
    }
    if let Some(progress) = patch.progress {
        job.progress = progress;
    }
    if let Some(result) = &patch.result {
        job.result = Some(result.clone());
    }
    if let Some(message) = &patch.error_message {
        job.error_message = Some(message.clone());
    }
    if let Some(code) = &patch.error_code {
        job.error_code = Some(code.clone());
    }
    job.updated_at = Utc::now();
}

fn apply_render_patch(job: &mut RenderJob, patch: &RenderJobPatch) {
    let now = Utc::now();
    if let Some(status) = patch.status {
        job.status = status.as_str().to_string();
    }
    if let Some(progress) = patch.progress {
        job.progress = progress;
    }
    if let Some(remaining) = patch.estimated_time_remaining {
        job.estimated_time_remaining = Some(remaining);
    }
    if let Some(url) = &patch.download_url {
        job.download_url = Some(url.clone());
    }
    if let Some(size) = patch.file_size {
        job.file_size = Some(size);
    }
    if let Some(duration) = patch.duration {
        job.duration = Some(duration);
    }
    if let Some(message) = &patch.error_message {
        job.error_message = Some(message.clone());
    }
    if let Some(code) = &patch.error_code {
        job.error_code = Some(code.clone());
    }
    stamp_lifecycle(job, now);
    job.updated_at = now;
}

fn stamp_lifecycle(job: &mut RenderJob, now: Timestamp) {
    match job.status() {
        Some(RenderStatus::Processing) => {
            job.started_at.get_or_insert(now);
        }
        Some(status) if status.is_terminal() => {
            job.completed_at.get_or_insert(now);
        }
        _ => {}
    }
}

fn status_in<S: Copy>(current: &str, expected: &[S], as_str: fn(S) -> &'static str) -> bool {
    expected.iter().any(|s| as_str(*s) == current)
}

fn newest_first<T>(mut rows: Vec<T>, created_at: fn(&T) -> Timestamp, limit: i64) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows.truncate(limit.clamp(1, MAX_LIMIT) as usize);
    rows
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        self.check_writable()?;
        let now = Utc::now();
        let job = Job {
            job_id: input.job_id.unwrap_or_else(JobId::new_v4),
            status: input.status.as_str().to_string(),
            progress: input.progress,
            video_url: input.video_url.clone(),
            file_key: input.file_key.clone(),
            result: None,
            error_message: None,
            error_code: None,
            created_at: now,
            updated_at: now,
        };
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Unavailable(format!("duplicate job id {}", job.job_id)));
        }
        jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(lock(&self.jobs).get(&job_id).cloned())
    }

    async fn update_job(&self, job_id: JobId, patch: &JobPatch) -> Result<bool, StoreError> {
        self.check_writable()?;
        match lock(&self.jobs).get_mut(&job_id) {
            Some(job) => {
                apply_job_patch(job, patch);
                Ok(true)
            }
            None => {
                tracing::warn!(%job_id, "Update on missing job");
                Ok(false)
            }
        }
    }

    async fn update_job_if_status(
        &self,
        job_id: JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&job_id) {
            Some(job) if status_in(&job.status, expected, JobStatus::as_str) => {
                apply_job_patch(job, patch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_jobs(&self, filter: &JobListFilter, limit: i64) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<Job> = lock(&self.jobs)
            .values()
            .filter(|job| filter.status.map_or(true, |s| job.status == s.as_str()))
            .cloned()
            .collect();
        Ok(newest_first(rows, |job| job.created_at, limit))
    }

    async fn delete_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        self.check_writable()?;
        Ok(lock(&self.jobs).remove(&job_id).is_some())
    }
}

#[async_trait]
impl RenderJobStore for MemoryStore {
    async fn create_render_job(&self, input: &CreateRenderJob) -> Result<RenderJob, StoreError> {
        self.check_writable()?;
        let now = Utc::now();
        let job = RenderJob {
            job_id: input.job_id.unwrap_or_else(JobId::new_v4),
            user_id: input.user_id.clone(),
            status: RenderStatus::Queued.as_str().to_string(),
            progress: 0,
            video_url: input.video_url.clone(),
            video_name: input.video_name.clone(),
            scenario: input.scenario.clone(),
            options: input.options.clone(),
            download_url: None,
            file_size: None,
            duration: None,
            estimated_time: Some(input.estimated_time),
            estimated_time_remaining: Some(input.estimated_time),
            error_message: None,
            error_code: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        let mut jobs = lock(&self.render_jobs);
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Unavailable(format!("duplicate job id {}", job.job_id)));
        }
        jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn get_render_job(&self, job_id: JobId) -> Result<Option<RenderJob>, StoreError> {
        Ok(lock(&self.render_jobs).get(&job_id).cloned())
    }

    async fn update_render_job(
        &self,
        job_id: JobId,
        patch: &RenderJobPatch,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        match lock(&self.render_jobs).get_mut(&job_id) {
            Some(job) => {
                apply_render_patch(job, patch);
                Ok(true)
            }
            None => {
                tracing::warn!(%job_id, "Update on missing render job");
                Ok(false)
            }
        }
    }

    async fn update_render_job_if_status(
        &self,
        job_id: JobId,
        expected: &[RenderStatus],
        patch: &RenderJobPatch,
    ) -> Result<Option<RenderJob>, StoreError> {
        self.check_writable()?;
        let mut jobs = lock(&self.render_jobs);
        match jobs.get_mut(&job_id) {
            Some(job) if status_in(&job.status, expected, RenderStatus::as_str) => {
                apply_render_patch(job, patch);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_render_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut jobs = lock(&self.render_jobs);
        match jobs.get_mut(&job_id) {
            Some(job) if status_in(&job.status, RenderStatus::ACTIVE, RenderStatus::as_str) => {
                let now = Utc::now();
                job.status = RenderStatus::Cancelled.as_str().to_string();
                job.completed_at.get_or_insert(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_render_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        self.check_writable()?;
        Ok(lock(&self.render_jobs).remove(&job_id).is_some())
    }

    async fn list_render_jobs(
        &self,
        filter: &RenderJobListFilter,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError> {
        let rows: Vec<RenderJob> = lock(&self.render_jobs)
            .values()
            .filter(|job| filter.user_id.is_none() || job.user_id == filter.user_id)
            .filter(|job| filter.status.map_or(true, |s| job.status == s.as_str()))
            .cloned()
            .collect();
        Ok(newest_first(rows, |job| job.created_at, limit))
    }

    async fn render_history(
        &self,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError> {
        let rows: Vec<RenderJob> = lock(&self.render_jobs)
            .values()
            .filter(|job| user_id.is_none() || job.user_id.as_deref() == user_id)
            .filter(|job| status_in(&job.status, RenderStatus::FINISHED, RenderStatus::as_str))
            .cloned()
            .collect();
        Ok(newest_first(rows, |job| job.created_at, limit))
    }

    async fn count_for_quota(
        &self,
        user_id: &str,
        day_start: Timestamp,
        month_start: Timestamp,
    ) -> Result<QuotaCounts, StoreError> {
        let jobs = lock(&self.render_jobs);
        let mut counts = QuotaCounts::default();
        for job in jobs.values().filter(|job| job.user_id.as_deref() == Some(user_id)) {
            let counted = job.status != RenderStatus::Cancelled.as_str();
            if counted && job.created_at >= day_start {
                counts.daily += 1;
            }
            if counted && job.created_at >= month_start {
                counts.monthly += 1;
            }
            if status_in(&job.status, RenderStatus::ACTIVE, RenderStatus::as_str) {
                counts.concurrent += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn record_usage(
        &self,
        user_id: &str,
        date: NaiveDate,
        delta: &UsageDelta,
    ) -> Result<UsageStats, StoreError> {
        self.check_writable()?;
        let now = Utc::now();
        let mut usage = lock(&self.usage);
        let row = usage
            .entry((user_id.to_string(), date))
            .or_insert_with(|| UsageStats {
                id: self.next_usage_id.fetch_add(1, Ordering::SeqCst) + 1,
                user_id: user_id.to_string(),
                date,
                render_count: 0,
                render_success_count: 0,
                render_failed_count: 0,
                total_duration: 0.0,
                total_processing_time: 0.0,
                total_file_size: 0,
                total_cues_processed: 0,
                avg_processing_time: 0.0,
                avg_file_size: 0.0,
                avg_cues_per_job: 0.0,
                created_at: now,
                updated_at: now,
            });

        row.render_count += 1;
        if delta.succeeded {
            row.render_success_count += 1;
            row.total_duration += delta.duration;
            row.total_processing_time += delta.processing_time;
            row.total_file_size += delta.file_size;
            row.total_cues_processed += delta.cues;
        } else {
            row.render_failed_count += 1;
        }
        if row.render_success_count > 0 {
            let successes = f64::from(row.render_success_count);
            row.avg_processing_time = row.total_processing_time / successes;
            row.avg_file_size = row.total_file_size as f64 / successes;
            row.avg_cues_per_job = row.total_cues_processed as f64 / successes;
        }
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn usage_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<UsageStats>, StoreError> {
        let mut rows: Vec<UsageStats> = lock(&self.usage)
            .values()
            .filter(|row| row.user_id == user_id && row.date >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.date));
        Ok(rows)
    }
}

#[async_trait]
impl RenderLimitStore for MemoryStore {
    async fn render_limits(&self, user_id: &str) -> Result<Option<RenderLimits>, StoreError> {
        Ok(lock(&self.limits).get(user_id).cloned())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_writable()
    }
}
