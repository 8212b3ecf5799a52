use std::{fmt, time::Duration};

use serde::Serialize;
use tracing::info;

use ensemble_common::ReplicaId;
use ensemble_consensus::Replica;

/// Counters read from the replica at the end of a run.
///
/// `fast + slow` may trail `total` while proposals are still in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub replica_id: ReplicaId,
    pub total: u64,
    pub fast: u64,
    pub slow: u64,
    pub conflict_rate: f64,
}

impl RunStatistics {
    pub fn fast_percent(&self) -> f64 {
        percent(self.fast, self.total)
    }

    pub fn slow_percent(&self) -> f64 {
        percent(self.slow, self.total)
    }

    pub fn in_flight(&self) -> u64 {
        self.total.saturating_sub(self.fast + self.slow)
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== STATISTICS ==========")?;
        writeln!(f, "Replica ID: {}", self.replica_id)?;
        writeln!(f, "Total Proposals: {}", self.total)?;
        writeln!(f, "Fast Path: {} ({:.2}%)", self.fast, self.fast_percent())?;
        writeln!(f, "Slow Path: {} ({:.2}%)", self.slow, self.slow_percent())?;
        writeln!(f, "Conflict Rate: {:.4}", self.conflict_rate)?;
        write!(f, "================================")
    }
}

/// Reads the final counters once in-flight proposals have had time to finish.
#[derive(Debug, Clone, Copy)]
pub struct StatisticsCollector {
    settle: Duration,
}

impl StatisticsCollector {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Read-only snapshot; safe to call any number of times.
    pub fn collect(replica: &dyn Replica) -> RunStatistics {
        RunStatistics {
            replica_id: replica.replica_id(),
            total: replica.total_proposals(),
            fast: replica.fast_path_count(),
            slow: replica.slow_path_count(),
            conflict_rate: replica.conflict_rate(),
        }
    }

    pub async fn settle_and_collect(&self, replica: &dyn Replica) -> RunStatistics {
        info!("waiting {:?} for in-flight proposals to execute", self.settle);
        tokio::time::sleep(self.settle).await;
        Self::collect(replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u64, fast: u64, slow: u64) -> RunStatistics {
        RunStatistics { replica_id: ReplicaId(0), total, fast, slow, conflict_rate: 0.5 }
    }

    #[test]
    fn test_zero_total_gives_zero_percent() {
        let s = stats(0, 0, 0);
        assert_eq!(s.fast_percent(), 0.0);
        assert_eq!(s.slow_percent(), 0.0);
    }

    #[test]
    fn test_percentages_never_exceed_hundred() {
        for (total, fast, slow) in [(1, 1, 0), (10, 3, 7), (7, 2, 2), (4000, 3999, 0)] {
            let s = stats(total, fast, slow);
            assert!(s.fast_percent() + s.slow_percent() <= 100.0 + 1e-9);
        }
        assert_eq!(stats(7, 2, 2).in_flight(), 3);
    }

    #[test]
    fn test_report_layout() {
        let report = stats(4, 1, 3).to_string();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(
            lines,
            vec![
                "========== STATISTICS ==========",
                "Replica ID: 0",
                "Total Proposals: 4",
                "Fast Path: 1 (25.00%)",
                "Slow Path: 3 (75.00%)",
                "Conflict Rate: 0.5000",
                "================================",
            ]
        );
    }
}
