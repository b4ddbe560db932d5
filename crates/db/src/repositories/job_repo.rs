//! Repository for the `jobs` table.

use hoit_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobListFilter, JobPatch};
use crate::models::status::{status_strings, JobStatus};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    job_id, status, progress, video_url, file_key, result, \
    error_message, error_code, created_at, updated_at";

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Shared `SET` clause for patches. `$1` is the job id.
const PATCH_SET: &str = "\
    status = COALESCE($2, status), \
    progress = COALESCE($3, progress), \
    result = COALESCE($4, result), \
    error_message = COALESCE($5, error_message), \
    error_code = COALESCE($6, error_code), \
    updated_at = NOW()";

/// Provides CRUD and conditional updates for transcription jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a job, generating its id when the input has none.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_id, status, progress, video_url, file_key) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.job_id.unwrap_or_else(JobId::new_v4))
            .bind(input.status.as_str())
            .bind(input.progress)
            .bind(&input.video_url)
            .bind(&input.file_key)
            .fetch_one(pool)
            .await
    }

    /// Find a job by id.
    pub async fn find_by_id(pool: &PgPool, job_id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a patch unconditionally. Returns `false` if the job does not exist.
    pub async fn update(pool: &PgPool, job_id: JobId, patch: &JobPatch) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE jobs SET {PATCH_SET} WHERE job_id = $1");
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(patch.status.map(JobStatus::as_str))
            .bind(patch.progress)
            .bind(&patch.result)
            .bind(&patch.error_message)
            .bind(&patch.error_code)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a patch only while the job's status is one of `expected`.
    ///
    /// Returns `true` if the row was updated. The status check and the write
    /// happen in one statement.
    pub async fn update_if_status(
        pool: &PgPool,
        job_id: JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE jobs SET {PATCH_SET} WHERE job_id = $1 AND status = ANY($7)");
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(patch.status.map(JobStatus::as_str))
            .bind(patch.progress)
            .bind(&patch.result)
            .bind(&patch.error_message)
            .bind(&patch.error_code)
            .bind(status_strings(expected))
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &JobListFilter,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(filter.status.map(JobStatus::as_str))
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }

    /// Delete a job. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, job_id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
