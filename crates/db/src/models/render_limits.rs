//! Per-user render limit overrides.

use hoit_core::quota::QuotaLimits;
use hoit_core::types::{Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `render_limits` table. `None` columns fall back to the
/// configured defaults.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderLimits {
    pub user_id: UserId,
    pub daily_limit: Option<i32>,
    pub monthly_limit: Option<i32>,
    pub concurrent_limit: Option<i32>,
    pub updated_at: Timestamp,
}

impl RenderLimits {
    /// Overlay this row on top of `defaults`.
    pub fn resolve(&self, defaults: QuotaLimits) -> QuotaLimits {
        QuotaLimits {
            daily: self.daily_limit.map_or(defaults.daily, i64::from),
            monthly: self.monthly_limit.map_or(defaults.monthly, i64::from),
            concurrent: self.concurrent_limit.map_or(defaults.concurrent, i64::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_set_columns() {
        let row = RenderLimits {
            user_id: "u1".to_string(),
            daily_limit: Some(3),
            monthly_limit: None,
            concurrent_limit: Some(1),
            updated_at: chrono::Utc::now(),
        };
        let limits = row.resolve(QuotaLimits::default());
        assert_eq!(
            limits,
            QuotaLimits {
                daily: 3,
                monthly: 100,
                concurrent: 1
            }
        );
    }
}
