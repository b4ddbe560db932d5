//! Per-user render admission control.
//!
//! The counts are gathered by the persistence layer; this module only
//! decides. Rules are evaluated daily, then monthly, then concurrent, and
//! the first one violated is reported.

use serde::Serialize;

/// Per-user render limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub daily: i64,
    pub monthly: i64,
    pub concurrent: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily: 10,
            monthly: 100,
            concurrent: 2,
        }
    }
}

/// Current usage counts for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaCounts {
    /// Non-cancelled jobs created today (UTC).
    pub daily: i64,
    /// Non-cancelled jobs created this calendar month (UTC).
    pub monthly: i64,
    /// Jobs currently queued or processing.
    pub concurrent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub used: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaType {
    Daily,
    Monthly,
    Concurrent,
}

impl QuotaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Concurrent => "concurrent",
        }
    }

    /// Machine-readable error code, e.g. `RENDER_QUOTA_DAILY_EXCEEDED`.
    pub fn error_code(self) -> String {
        format!("RENDER_QUOTA_{}_EXCEEDED", self.as_str().to_ascii_uppercase())
    }

    /// Concurrency denials are transient (429); the others are policy (403).
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Concurrent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed {
        daily: QuotaUsage,
        monthly: QuotaUsage,
        concurrent: QuotaUsage,
    },
    Denied {
        quota_type: QuotaType,
        reason: String,
        usage: QuotaUsage,
    },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Decide whether one more render job may be admitted.
pub fn evaluate(counts: QuotaCounts, limits: QuotaLimits) -> QuotaDecision {
    let checks = [
        (QuotaType::Daily, counts.daily, limits.daily, "Daily quota exceeded"),
        (QuotaType::Monthly, counts.monthly, limits.monthly, "Monthly quota exceeded"),
        (
            QuotaType::Concurrent,
            counts.concurrent,
            limits.concurrent,
            "Too many concurrent jobs",
        ),
    ];

    for (quota_type, used, limit, label) in checks {
        if used >= limit {
            return QuotaDecision::Denied {
                quota_type,
                reason: format!("{label} ({used}/{limit})"),
                usage: QuotaUsage { used, limit },
            };
        }
    }

    QuotaDecision::Allowed {
        daily: QuotaUsage {
            used: counts.daily,
            limit: limits.daily,
        },
        monthly: QuotaUsage {
            used: counts.monthly,
            limit: limits.monthly,
        },
        concurrent: QuotaUsage {
            used: counts.concurrent,
            limit: limits.concurrent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn counts(daily: i64, monthly: i64, concurrent: i64) -> QuotaCounts {
        QuotaCounts {
            daily,
            monthly,
            concurrent,
        }
    }

    #[test]
    fn allowed_carries_all_snapshots() {
        let decision = evaluate(counts(3, 20, 1), QuotaLimits::default());
        assert_matches!(
            decision,
            QuotaDecision::Allowed { daily, monthly, concurrent }
                if daily == QuotaUsage { used: 3, limit: 10 }
                    && monthly == QuotaUsage { used: 20, limit: 100 }
                    && concurrent == QuotaUsage { used: 1, limit: 2 }
        );
    }

    #[test]
    fn daily_at_limit_is_denied() {
        let decision = evaluate(counts(10, 10, 0), QuotaLimits::default());
        assert_matches!(
            decision,
            QuotaDecision::Denied { quota_type: QuotaType::Daily, ref reason, usage }
                if reason == "Daily quota exceeded (10/10)" && usage.used == 10
        );
    }

    #[test]
    fn daily_wins_over_other_violations() {
        let decision = evaluate(counts(10, 100, 2), QuotaLimits::default());
        assert_matches!(decision, QuotaDecision::Denied { quota_type: QuotaType::Daily, .. });
    }

    #[test]
    fn monthly_checked_before_concurrent() {
        let decision = evaluate(counts(1, 100, 5), QuotaLimits::default());
        assert_matches!(decision, QuotaDecision::Denied { quota_type: QuotaType::Monthly, .. });
    }

    #[test]
    fn concurrent_boundary() {
        let limits = QuotaLimits::default();
        assert!(evaluate(counts(0, 0, limits.concurrent - 1), limits).is_allowed());
        assert_matches!(
            evaluate(counts(0, 0, limits.concurrent), limits),
            QuotaDecision::Denied { quota_type: QuotaType::Concurrent, ref reason, .. }
                if reason == "Too many concurrent jobs (2/2)"
        );
    }

    #[test]
    fn error_codes_and_transience() {
        assert_eq!(QuotaType::Daily.error_code(), "RENDER_QUOTA_DAILY_EXCEEDED");
        assert_eq!(QuotaType::Concurrent.error_code(), "RENDER_QUOTA_CONCURRENT_EXCEEDED");
        assert!(QuotaType::Concurrent.is_transient());
        assert!(!QuotaType::Monthly.is_transient());
    }
}
