use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use ensemble_common::{CommandFactory, EnsembleError, Result};
use ensemble_consensus::Replica;

use crate::config::{Schedule, PROPOSER_COUNTER_STRIDE};

/// Counter owned by one proposer; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposerState {
    proposer: usize,
    counter: u64,
}

impl ProposerState {
    pub fn new(proposer: usize) -> Self {
        Self { proposer, counter: proposer as u64 * PROPOSER_COUNTER_STRIDE }
    }

    pub fn proposer(&self) -> usize {
        self.proposer
    }

    /// Returns the current counter and advances it.
    pub fn next_counter(&mut self) -> u64 {
        let current = self.counter;
        self.counter += 1;
        current
    }
}

/// What one worker did, as `[first_counter, end_counter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub proposer: usize,
    pub first_counter: u64,
    pub end_counter: u64,
    pub submitted: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    pub fn submitted(&self) -> u64 {
        self.workers.iter().map(|w| w.submitted).sum()
    }
}

/// Fixed set of proposer workers submitting single-command batches.
#[derive(Debug, Clone, Copy)]
pub struct ProposerPool {
    concurrency: usize,
    schedule: Schedule,
}

impl ProposerPool {
    /// Requests below one are clamped to a single proposer.
    pub fn new(requested: i64, schedule: Schedule) -> Self {
        let concurrency = usize::try_from(requested.max(1)).unwrap_or(1);
        Self { concurrency, schedule }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Spawns one worker per proposer and waits until every worker has issued
    /// all of its submissions.
    pub async fn run(&self, replica: Arc<dyn Replica>, factory: CommandFactory) -> Result<PoolReport> {
        let mut workers = JoinSet::new();
        for proposer in 0..self.concurrency {
            let replica = Arc::clone(&replica);
            let schedule = self.schedule;
            workers.spawn(async move {
                let mut state = ProposerState::new(proposer);
                let first_counter = state.counter;
                for _ in 0..schedule.iterations {
                    tokio::time::sleep(schedule.interval()).await;
                    let command = factory.make_now(state.proposer(), state.next_counter());
                    replica.propose(vec![command]);
                }
                debug!("proposer {} finished", proposer);
                WorkerReport {
                    proposer,
                    first_counter,
                    end_counter: state.counter,
                    submitted: schedule.iterations,
                }
            });
        }

        let mut report = PoolReport::default();
        while let Some(joined) = workers.join_next().await {
            let worker = joined
                .map_err(|e| EnsembleError::Other(format!("proposer worker failed: {e}")))?;
            report.workers.push(worker);
        }
        report.workers.sort_by_key(|w| w.proposer);

        info!(
            "{} proposer(s) submitted {} command(s)",
            report.workers.len(),
            report.submitted()
        );
        Ok(report)
    }
}
