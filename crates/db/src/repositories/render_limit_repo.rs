//! Repository for the `render_limits` table.

use sqlx::PgPool;

use crate::models::render_limits::RenderLimits;

const COLUMNS: &str = "user_id, daily_limit, monthly_limit, concurrent_limit, updated_at";

pub struct RenderLimitRepo;

impl RenderLimitRepo {
    /// The override row for `user_id`, if any.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<RenderLimits>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM render_limits WHERE user_id = $1");
        sqlx::query_as::<_, RenderLimits>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the override row for `user_id`.
    pub async fn upsert(
        pool: &PgPool,
        user_id: &str,
        daily: Option<i32>,
        monthly: Option<i32>,
        concurrent: Option<i32>,
    ) -> Result<RenderLimits, sqlx::Error> {
        let query = format!(
            "INSERT INTO render_limits (user_id, daily_limit, monthly_limit, concurrent_limit) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 daily_limit = EXCLUDED.daily_limit, \
                 monthly_limit = EXCLUDED.monthly_limit, \
                 concurrent_limit = EXCLUDED.concurrent_limit, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderLimits>(&query)
            .bind(user_id)
            .bind(daily)
            .bind(monthly)
            .bind(concurrent)
            .fetch_one(pool)
            .await
    }
}
