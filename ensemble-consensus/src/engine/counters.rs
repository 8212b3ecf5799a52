use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative decision counters shared between proposers and the decider.
#[derive(Debug, Default)]
pub struct PathCounters {
    total: AtomicU64,
    fast: AtomicU64,
    slow: AtomicU64,
    conflicted: AtomicU64,
}

impl PathCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_proposal(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self, conflicted: bool) {
        if conflicted {
            self.conflicted.fetch_add(1, Ordering::Relaxed);
            self.slow.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fast.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Seeds the counters from a replayed log: every restored instance was both
    /// proposed and decided.
    pub fn restore(&self, fast: u64, slow: u64) {
        self.total.fetch_add(fast + slow, Ordering::Relaxed);
        self.fast.fetch_add(fast, Ordering::Relaxed);
        self.slow.fetch_add(slow, Ordering::Relaxed);
        self.conflicted.fetch_add(slow, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn fast(&self) -> u64 {
        self.fast.load(Ordering::Relaxed)
    }

    pub fn slow(&self) -> u64 {
        self.slow.load(Ordering::Relaxed)
    }

    pub fn conflict_rate(&self) -> f64 {
        let decided = self.fast() + self.slow();
        if decided == 0 {
            return 0.0;
        }
        self.conflicted.load(Ordering::Relaxed) as f64 / decided as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rate_is_zero() {
        assert_eq!(PathCounters::new().conflict_rate(), 0.0);
    }

    #[test]
    fn test_rate_tracks_conflicts() {
        let counters = PathCounters::new();
        for _ in 0..4 {
            counters.record_proposal();
        }
        counters.record_decision(true);
        counters.record_decision(false);
        counters.record_decision(false);

        assert_eq!(counters.total(), 4);
        assert_eq!(counters.fast(), 2);
        assert_eq!(counters.slow(), 1);
        assert!((counters.conflict_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert!(counters.fast() + counters.slow() <= counters.total());
    }

    #[test]
    fn test_restore_seeds_all_counters() {
        let counters = PathCounters::new();
        counters.restore(3, 1);
        assert_eq!(counters.total(), 4);
        assert_eq!(counters.fast(), 3);
        assert_eq!(counters.slow(), 1);
        assert!((counters.conflict_rate() - 0.25).abs() < 1e-9);
    }
}
