//! Monitoring history and scheduler statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted count observation for a subscription.
///
/// Rows are append-only: the latest row per subscription is the baseline for
/// the next comparison, and rows are removed only by subscription cascade or
/// the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub subscription_id: i64,
    pub count: i64,
    pub checked_at: DateTime<Utc>,
    pub changed: bool,
}

/// Scheduler counters. Owned by the monitor, mutated only during cycles,
/// exposed as a cloned snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub total_changes: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub is_running: bool,
}

impl MonitoringStats {
    /// Share of cycles that completed successfully, as a whole percentage.
    pub fn success_rate(&self) -> u64 {
        if self.total_checks == 0 {
            return 0;
        }
        self.successful_checks * 100 / self.total_checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_zero_checks() {
        assert_eq!(MonitoringStats::default().success_rate(), 0);
    }

    #[test]
    fn success_rate_rounds_down() {
        let stats = MonitoringStats {
            total_checks: 3,
            successful_checks: 2,
            ..Default::default()
        };
        assert_eq!(stats.success_rate(), 66);
    }
}
