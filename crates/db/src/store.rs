//! Store traits consumed by the pipeline and the API.
//!
//! The orchestration code only ever sees these traits; [`PgStore`] backs them
//! with the repositories, and `memory::MemoryStore` (feature `test-util`)
//! backs them in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use hoit_core::quota::QuotaCounts;
use hoit_core::types::{JobId, Timestamp};

use crate::models::job::{CreateJob, Job, JobListFilter, JobPatch};
use crate::models::render_job::{CreateRenderJob, RenderJob, RenderJobListFilter, RenderJobPatch};
use crate::models::render_limits::RenderLimits;
use crate::models::status::{JobStatus, RenderStatus};
use crate::models::usage_stats::{UsageDelta, UsageStats};
use crate::repositories::{JobRepo, RenderJobRepo, RenderLimitRepo, UsageStatsRepo};
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Non-database backend failure (used by the in-memory store).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply `patch`. Returns `false` if the job does not exist. Does not
    /// enforce status transitions.
    async fn update_job(&self, job_id: JobId, patch: &JobPatch) -> Result<bool, StoreError>;

    /// Apply `patch` only while the status is one of `expected`.
    async fn update_job_if_status(
        &self,
        job_id: JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> Result<bool, StoreError>;

    async fn list_jobs(&self, filter: &JobListFilter, limit: i64) -> Result<Vec<Job>, StoreError>;

    async fn delete_job(&self, job_id: JobId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RenderJobStore: Send + Sync {
    async fn create_render_job(&self, input: &CreateRenderJob) -> Result<RenderJob, StoreError>;

    async fn get_render_job(&self, job_id: JobId) -> Result<Option<RenderJob>, StoreError>;

    /// Apply `patch`. Returns `false` if the job does not exist.
    async fn update_render_job(
        &self,
        job_id: JobId,
        patch: &RenderJobPatch,
    ) -> Result<bool, StoreError>;

    /// Apply `patch` only while the status is one of `expected`, returning
    /// the updated row.
    async fn update_render_job_if_status(
        &self,
        job_id: JobId,
        expected: &[RenderStatus],
        patch: &RenderJobPatch,
    ) -> Result<Option<RenderJob>, StoreError>;

    /// Move a queued/processing job to `cancelled`.
    async fn cancel_render_job(&self, job_id: JobId) -> Result<bool, StoreError>;

    async fn delete_render_job(&self, job_id: JobId) -> Result<bool, StoreError>;

    async fn list_render_jobs(
        &self,
        filter: &RenderJobListFilter,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError>;

    /// Completed and failed jobs, newest first.
    async fn render_history(
        &self,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError>;

    async fn count_for_quota(
        &self,
        user_id: &str,
        day_start: Timestamp,
        month_start: Timestamp,
    ) -> Result<QuotaCounts, StoreError>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record_usage(
        &self,
        user_id: &str,
        date: NaiveDate,
        delta: &UsageDelta,
    ) -> Result<UsageStats, StoreError>;

    async fn usage_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<UsageStats>, StoreError>;
}

#[async_trait]
pub trait RenderLimitStore: Send + Sync {
    async fn render_limits(&self, user_id: &str) -> Result<Option<RenderLimits>, StoreError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Confirm the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        Ok(JobRepo::create(&self.pool, input).await?)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn update_job(&self, job_id: JobId, patch: &JobPatch) -> Result<bool, StoreError> {
        let updated = JobRepo::update(&self.pool, job_id, patch).await?;
        if !updated {
            tracing::warn!(%job_id, "Update on missing job");
        }
        Ok(updated)
    }

    async fn update_job_if_status(
        &self,
        job_id: JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::update_if_status(&self.pool, job_id, expected, patch).await?)
    }

    async fn list_jobs(&self, filter: &JobListFilter, limit: i64) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list(&self.pool, filter, limit).await?)
    }

    async fn delete_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        Ok(JobRepo::delete(&self.pool, job_id).await?)
    }
}

#[async_trait]
impl RenderJobStore for PgStore {
    async fn create_render_job(&self, input: &CreateRenderJob) -> Result<RenderJob, StoreError> {
        Ok(RenderJobRepo::create(&self.pool, input).await?)
    }

    async fn get_render_job(&self, job_id: JobId) -> Result<Option<RenderJob>, StoreError> {
        Ok(RenderJobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn update_render_job(
        &self,
        job_id: JobId,
        patch: &RenderJobPatch,
    ) -> Result<bool, StoreError> {
        let updated = RenderJobRepo::update(&self.pool, job_id, patch).await?;
        if !updated {
            tracing::warn!(%job_id, "Update on missing render job");
        }
        Ok(updated)
    }

    async fn update_render_job_if_status(
        &self,
        job_id: JobId,
        expected: &[RenderStatus],
        patch: &RenderJobPatch,
    ) -> Result<Option<RenderJob>, StoreError> {
        Ok(RenderJobRepo::update_if_status(&self.pool, job_id, expected, patch).await?)
    }

    async fn cancel_render_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        Ok(RenderJobRepo::cancel(&self.pool, job_id).await?)
    }

    async fn delete_render_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        Ok(RenderJobRepo::delete(&self.pool, job_id).await?)
    }

    async fn list_render_jobs(
        &self,
        filter: &RenderJobListFilter,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError> {
        Ok(RenderJobRepo::list(&self.pool, filter, limit).await?)
    }

    async fn render_history(
        &self,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RenderJob>, StoreError> {
        Ok(RenderJobRepo::history(&self.pool, user_id, limit).await?)
    }

    async fn count_for_quota(
        &self,
        user_id: &str,
        day_start: Timestamp,
        month_start: Timestamp,
    ) -> Result<QuotaCounts, StoreError> {
        Ok(RenderJobRepo::count_for_quota(&self.pool, user_id, day_start, month_start).await?)
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn record_usage(
        &self,
        user_id: &str,
        date: NaiveDate,
        delta: &UsageDelta,
    ) -> Result<UsageStats, StoreError> {
        Ok(UsageStatsRepo::record(&self.pool, user_id, date, delta).await?)
    }

    async fn usage_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<UsageStats>, StoreError> {
        Ok(UsageStatsRepo::list_since(&self.pool, user_id, since).await?)
    }
}

#[async_trait]
impl RenderLimitStore for PgStore {
    async fn render_limits(&self, user_id: &str) -> Result<Option<RenderLimits>, StoreError> {
        Ok(RenderLimitRepo::find_for_user(&self.pool, user_id).await?)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
