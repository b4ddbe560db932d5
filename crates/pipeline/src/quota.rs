//! Render admission control against the persisted job counts.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use hoit_core::quota::{evaluate, QuotaDecision, QuotaLimits};
use hoit_core::types::Timestamp;
use hoit_db::store::{RenderJobStore, RenderLimitStore};

use crate::error::PipelineError;

/// Applies the daily, monthly and concurrent render limits for a user.
///
/// The check and the subsequent insert are not atomic: two concurrent
/// creates for the same user can both be admitted at the limit boundary.
#[derive(Clone)]
pub struct QuotaGuard {
    render_jobs: Arc<dyn RenderJobStore>,
    limits: Arc<dyn RenderLimitStore>,
    defaults: QuotaLimits,
}

impl QuotaGuard {
    pub fn new(
        render_jobs: Arc<dyn RenderJobStore>,
        limits: Arc<dyn RenderLimitStore>,
        defaults: QuotaLimits,
    ) -> Self {
        Self {
            render_jobs,
            limits,
            defaults,
        }
    }

    /// Limits in force for `user_id`: the stored override, else defaults.
    pub async fn limits_for(&self, user_id: &str) -> Result<QuotaLimits, PipelineError> {
        Ok(self
            .limits
            .render_limits(user_id)
            .await?
            .map_or(self.defaults, |row| row.resolve(self.defaults)))
    }

    pub async fn check(&self, user_id: &str) -> Result<QuotaDecision, PipelineError> {
        let limits = self.limits_for(user_id).await?;
        let (day_start, month_start) = windows(Utc::now());
        let counts = self
            .render_jobs
            .count_for_quota(user_id, day_start, month_start)
            .await?;

        let decision = evaluate(counts, limits);
        if let QuotaDecision::Denied { quota_type, reason, .. } = &decision {
            tracing::info!(user_id, quota_type = quota_type.as_str(), reason = %reason, "Render quota denied");
        }
        Ok(decision)
    }
}

/// UTC midnight today and midnight on the first of this month.
fn windows(now: DateTime<Utc>) -> (Timestamp, Timestamp) {
    let today = now.date_naive();
    let day_start = today.and_time(NaiveTime::MIN).and_utc();
    let month_start = today
        .with_day(1)
        .unwrap_or(today)
        .and_time(NaiveTime::MIN)
        .and_utc();
    (day_start, month_start)
}
