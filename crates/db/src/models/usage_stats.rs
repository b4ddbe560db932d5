//! Daily per-user render usage rows.

use chrono::NaiveDate;
use hoit_core::types::{Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `render_usage_stats` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageStats {
    pub id: i64,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub render_count: i32,
    pub render_success_count: i32,
    pub render_failed_count: i32,
    pub total_duration: f64,
    pub total_processing_time: f64,
    pub total_file_size: i64,
    pub total_cues_processed: i64,
    pub avg_processing_time: f64,
    pub avg_file_size: f64,
    pub avg_cues_per_job: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UsageStats {
    /// Fraction of renders that succeeded; zero when none were recorded.
    pub fn success_rate(&self) -> f64 {
        if self.render_count > 0 {
            f64::from(self.render_success_count) / f64::from(self.render_count)
        } else {
            0.0
        }
    }
}

/// Contribution of one finished render to its owner's daily row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageDelta {
    pub succeeded: bool,
    /// Output video length, seconds. Successes only.
    pub duration: f64,
    /// Seconds from start to completion. Successes only.
    pub processing_time: f64,
    /// Output size, bytes. Successes only.
    pub file_size: i64,
    /// Cues in the rendered scenario. Successes only.
    pub cues: i64,
}

impl UsageDelta {
    pub fn failure() -> Self {
        Self::default()
    }
}
