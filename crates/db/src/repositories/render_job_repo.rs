//! Repository for the `render_jobs` table.
//!
//! Lifecycle timestamps are owned by the SQL here: `started_at` is stamped
//! on the first write that leaves the row `processing`, `completed_at` on the
//! first write that leaves it terminal. Neither is ever overwritten.

use hoit_core::quota::QuotaCounts;
use hoit_core::types::{JobId, Timestamp};
use sqlx::PgPool;

use crate::models::render_job::{CreateRenderJob, RenderJob, RenderJobListFilter, RenderJobPatch};
use crate::models::status::{status_strings, RenderStatus};

/// Column list for `render_jobs` queries.
const COLUMNS: &str = "\
    job_id, user_id, status, progress, video_url, video_name, scenario, options, \
    download_url, file_size, duration, estimated_time, estimated_time_remaining, \
    error_message, error_code, created_at, started_at, completed_at, updated_at";

/// Maximum page size for listings and history.
pub const MAX_LIMIT: i64 = 100;

/// Shared `SET` clause for patches. `$1` is the job id, `$2` the new status.
const PATCH_SET: &str = "\
    status = COALESCE($2, status), \
    progress = COALESCE($3, progress), \
    estimated_time_remaining = COALESCE($4, estimated_time_remaining), \
    download_url = COALESCE($5, download_url), \
    file_size = COALESCE($6, file_size), \
    duration = COALESCE($7, duration), \
    error_message = COALESCE($8, error_message), \
    error_code = COALESCE($9, error_code), \
    started_at = COALESCE(started_at, \
        CASE WHEN COALESCE($2, status) = 'processing' THEN NOW() END), \
    completed_at = COALESCE(completed_at, \
        CASE WHEN COALESCE($2, status) IN ('completed', 'failed', 'cancelled') THEN NOW() END), \
    updated_at = NOW()";

/// Provides CRUD, conditional updates and quota counting for render jobs.
pub struct RenderJobRepo;

impl RenderJobRepo {
    /// Insert a `queued` render job. `estimated_time_remaining` starts at the
    /// estimate.
    pub async fn create(pool: &PgPool, input: &CreateRenderJob) -> Result<RenderJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO render_jobs \
                 (job_id, user_id, status, progress, video_url, video_name, scenario, options, \
                  estimated_time, estimated_time_remaining) \
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(input.job_id.unwrap_or_else(JobId::new_v4))
            .bind(&input.user_id)
            .bind(RenderStatus::Queued.as_str())
            .bind(&input.video_url)
            .bind(&input.video_name)
            .bind(&input.scenario)
            .bind(&input.options)
            .bind(input.estimated_time)
            .fetch_one(pool)
            .await
    }

    /// Find a render job by id.
    pub async fn find_by_id(
        pool: &PgPool,
        job_id: JobId,
    ) -> Result<Option<RenderJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM render_jobs WHERE job_id = $1");
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a patch unconditionally. Returns `false` if the job does not exist.
    pub async fn update(
        pool: &PgPool,
        job_id: JobId,
        patch: &RenderJobPatch,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE render_jobs SET {PATCH_SET} WHERE job_id = $1");
        let result = bind_patch(sqlx::query(&query).bind(job_id), patch)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a patch only while the status is one of `expected`.
    ///
    /// Returns the updated row, or `None` if the job is missing or its status
    /// did not match.
    pub async fn update_if_status(
        pool: &PgPool,
        job_id: JobId,
        expected: &[RenderStatus],
        patch: &RenderJobPatch,
    ) -> Result<Option<RenderJob>, sqlx::Error> {
        let sql = format!(
            "UPDATE render_jobs SET {PATCH_SET} \
             WHERE job_id = $1 AND status = ANY($10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderJob>(&sql)
            .bind(job_id)
            .bind(patch.status.map(RenderStatus::as_str))
            .bind(patch.progress)
            .bind(patch.estimated_time_remaining)
            .bind(&patch.download_url)
            .bind(patch.file_size)
            .bind(patch.duration)
            .bind(&patch.error_message)
            .bind(&patch.error_code)
            .bind(status_strings(expected))
            .fetch_optional(pool)
            .await
    }

    /// Cancel a queued or processing job.
    ///
    /// Returns `true` if the job was cancelled, `false` if it was missing or
    /// already terminal.
    pub async fn cancel(pool: &PgPool, job_id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = $2, completed_at = COALESCE(completed_at, NOW()), updated_at = NOW() \
             WHERE job_id = $1 AND status = ANY($3)",
        )
        .bind(job_id)
        .bind(RenderStatus::Cancelled.as_str())
        .bind(status_strings(RenderStatus::ACTIVE))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List render jobs, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &RenderJobListFilter,
        limit: i64,
    ) -> Result<Vec<RenderJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM render_jobs \
             WHERE ($1::TEXT IS NULL OR user_id = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(&filter.user_id)
            .bind(filter.status.map(RenderStatus::as_str))
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }

    /// Completed and failed jobs, newest first, optionally scoped to one user.
    pub async fn history(
        pool: &PgPool,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RenderJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM render_jobs \
             WHERE ($1::TEXT IS NULL OR user_id = $1) \
               AND status = ANY($2) \
             ORDER BY created_at DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(user_id)
            .bind(status_strings(RenderStatus::FINISHED))
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }

    /// Counts feeding the quota decision, in one round trip.
    pub async fn count_for_quota(
        pool: &PgPool,
        user_id: &str,
        day_start: Timestamp,
        month_start: Timestamp,
    ) -> Result<QuotaCounts, sqlx::Error> {
        let (daily, monthly, concurrent): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE created_at >= $2 AND status <> $4), \
                 COUNT(*) FILTER (WHERE created_at >= $3 AND status <> $4), \
                 COUNT(*) FILTER (WHERE status = ANY($5)) \
             FROM render_jobs \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(day_start)
        .bind(month_start)
        .bind(RenderStatus::Cancelled.as_str())
        .bind(status_strings(RenderStatus::ACTIVE))
        .fetch_one(pool)
        .await?;

        Ok(QuotaCounts {
            daily,
            monthly,
            concurrent,
        })
    }

    /// Delete a render job. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, job_id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM render_jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn bind_patch<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    patch: &'q RenderJobPatch,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(patch.status.map(RenderStatus::as_str))
        .bind(patch.progress)
        .bind(patch.estimated_time_remaining)
        .bind(&patch.download_url)
        .bind(patch.file_size)
        .bind(patch.duration)
        .bind(&patch.error_message)
        .bind(&patch.error_code)
}
