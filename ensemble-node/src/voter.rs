//! voter.rs
//!
//! State-machine adapter handed to the replica.
//!
//! The replica calls back into [`Voter`] to apply decided batches and to ask
//! whether two batches conflict. Applying a command only writes a diagnostic
//! line tagged with the replica's current conflict rate.
//!
//! `execute` is not idempotent: a batch redelivered by the engine (for example
//! while replaying after a restore) is logged again. Deduplication would have
//! to key on command identity before reaching this adapter.

use std::sync::{Arc, OnceLock, Weak};

use tracing::info;

use ensemble_common::{Command, EnsembleError, Result};
use ensemble_consensus::{ConflictGauge, ExecutionOutput, StateMachine};

/// Decides whether two batches must be strictly ordered.
pub type ConflictPolicy = Arc<dyn Fn(&[Command], &[Command]) -> bool + Send + Sync>;

/// Treats every pair of batches as conflicting, forcing the ordered path.
pub fn always_conflict(_a: &[Command], _b: &[Command]) -> bool {
    true
}

/// Destination of the per-command diagnostic lines.
pub trait ExecutionLog: Send + Sync {
    fn record(&self, line: &str);
}

/// Emits each line as a `tracing` event on the `execution` target, which the
/// binary routes to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExecutionLog;

impl ExecutionLog for TracingExecutionLog {
    fn record(&self, line: &str) {
        info!(target: "execution", "{}", line);
    }
}

pub struct Voter {
    replica: OnceLock<Weak<dyn ConflictGauge>>,
    policy: ConflictPolicy,
    log: Arc<dyn ExecutionLog>,
}

impl Default for Voter {
    fn default() -> Self {
        Self::new()
    }
}

impl Voter {
    pub fn new() -> Self {
        Self {
            replica: OnceLock::new(),
            policy: Arc::new(always_conflict),
            log: Arc::new(TracingExecutionLog),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn ExecutionLog>) -> Self {
        self.log = log;
        self
    }

    /// Attaches the replica whose conflict rate tags the diagnostics.
    ///
    /// The association is non-owning and can be made only once.
    pub fn set_replica<R: ConflictGauge + 'static>(&self, replica: &Arc<R>) -> Result<()> {
        let weak: Weak<R> = Arc::downgrade(replica);
        let weak: Weak<dyn ConflictGauge> = weak;
        self.replica
            .set(weak)
            .map_err(|_| EnsembleError::Replica("voter already attached to a replica".into()))
    }

    pub fn has_replica(&self) -> bool {
        self.replica.get().is_some()
    }

    /// 0.0 until a live replica is attached.
    pub fn conflict_rate(&self) -> f64 {
        self.replica
            .get()
            .and_then(Weak::upgrade)
            .map(|r| r.conflict_rate())
            .unwrap_or(0.0)
    }
}

impl StateMachine for Voter {
    fn execute(&self, batch: &[Command]) -> Result<Vec<ExecutionOutput>> {
        let rate = self.conflict_rate();
        if batch.is_empty() {
            self.log.record(&format!("From: No op | conflict rate: {:.4}", rate));
        } else {
            for command in batch {
                self.log.record(&format!("{} | conflict rate: {:.4}", command, rate));
            }
        }
        Ok(Vec::new())
    }

    fn have_conflicts(&self, a: &[Command], b: &[Command]) -> bool {
        (self.policy)(a, b)
    }
}
