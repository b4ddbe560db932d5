//! Repository for the `render_usage_stats` table.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::usage_stats::{UsageDelta, UsageStats};

/// Column list for `render_usage_stats` queries.
const COLUMNS: &str = "\
    id, user_id, date, render_count, render_success_count, render_failed_count, \
    total_duration, total_processing_time, total_file_size, total_cues_processed, \
    avg_processing_time, avg_file_size, avg_cues_per_job, created_at, updated_at";

/// Daily usage accumulation.
pub struct UsageStatsRepo;

impl UsageStatsRepo {
    /// Fold one finished render into the `(user_id, date)` row, creating it on
    /// first use. Averages are recomputed from the new totals in the same
    /// statement.
    pub async fn record(
        pool: &PgPool,
        user_id: &str,
        date: NaiveDate,
        delta: &UsageDelta,
    ) -> Result<UsageStats, sqlx::Error> {
        let (success, failed) = if delta.succeeded { (1_i32, 0_i32) } else { (0, 1) };
        let query = format!(
            "INSERT INTO render_usage_stats AS s \
                 (user_id, date, render_count, render_success_count, render_failed_count, \
                  total_duration, total_processing_time, total_file_size, total_cues_processed, \
                  avg_processing_time, avg_file_size, avg_cues_per_job) \
             VALUES ($1, $2, 1, $3, $4, $5, $6, $7, $8, \
                  COALESCE($6 / NULLIF($3, 0), 0), \
                  COALESCE($7::DOUBLE PRECISION / NULLIF($3, 0), 0), \
                  COALESCE($8::DOUBLE PRECISION / NULLIF($3, 0), 0)) \
             ON CONFLICT ON CONSTRAINT uq_render_usage_user_date DO UPDATE SET \
                 render_count = s.render_count + 1, \
                 render_success_count = s.render_success_count + EXCLUDED.render_success_count, \
                 render_failed_count = s.render_failed_count + EXCLUDED.render_failed_count, \
                 total_duration = s.total_duration + EXCLUDED.total_duration, \
                 total_processing_time = s.total_processing_time + EXCLUDED.total_processing_time, \
                 total_file_size = s.total_file_size + EXCLUDED.total_file_size, \
                 total_cues_processed = s.total_cues_processed + EXCLUDED.total_cues_processed, \
                 avg_processing_time = COALESCE( \
                     (s.total_processing_time + EXCLUDED.total_processing_time) \
                     / NULLIF(s.render_success_count + EXCLUDED.render_success_count, 0), \
                     s.avg_processing_time), \
                 avg_file_size = COALESCE( \
                     (s.total_file_size + EXCLUDED.total_file_size)::DOUBLE PRECISION \
                     / NULLIF(s.render_success_count + EXCLUDED.render_success_count, 0), \
                     s.avg_file_size), \
                 avg_cues_per_job = COALESCE( \
                     (s.total_cues_processed + EXCLUDED.total_cues_processed)::DOUBLE PRECISION \
                     / NULLIF(s.render_success_count + EXCLUDED.render_success_count, 0), \
                     s.avg_cues_per_job), \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        let (duration, processing_time, file_size, cues) = if delta.succeeded {
            (delta.duration, delta.processing_time, delta.file_size, delta.cues)
        } else {
            (0.0, 0.0, 0, 0)
        };
        sqlx::query_as::<_, UsageStats>(&query)
            .bind(user_id)
            .bind(date)
            .bind(success)
            .bind(failed)
            .bind(duration)
            .bind(processing_time)
            .bind(file_size)
            .bind(cues)
            .fetch_one(pool)
            .await
    }

    /// Rows for `user_id` on or after `since`, newest first.
    pub async fn list_since(
        pool: &PgPool,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<UsageStats>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM render_usage_stats \
             WHERE user_id = $1 AND date >= $2 \
             ORDER BY date DESC"
        );
        sqlx::query_as::<_, UsageStats>(&query)
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }
}
