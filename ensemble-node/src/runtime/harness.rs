//! One complete demo run: build, warm up, start, drive, settle, report.

use std::sync::Arc;

use tracing::{info, warn};

use ensemble_common::{CommandFactory, ReplicaId, Result};
use ensemble_consensus::{Replica, Transport};

use crate::{
    config::HarnessConfig,
    runtime::{
        lifecycle::ReplicaLifecycle,
        proposer::ProposerPool,
        stats::{RunStatistics, StatisticsCollector},
    },
    voter::Voter,
};

/// Where the run banners go. Progress goes to stdout; the restore notice
/// goes to stderr.
pub trait Console: Send + Sync {
    fn out(&self, line: &str);
    fn err(&self, line: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn out(&self, line: &str) {
        println!("{}", line);
    }

    fn err(&self, line: &str) {
        eprintln!("{}", line);
    }
}

pub const RESTORE_BANNER: &str = "===restore===";

pub fn running_banner(concurrency: usize) -> String {
    format!("Running with {} concurrent proposer(s)", concurrency)
}

pub struct Harness {
    config: HarnessConfig,
    id: ReplicaId,
    restore: bool,
    requested_concurrency: i64,
    transport: Option<Arc<dyn Transport>>,
    voter: Option<Arc<Voter>>,
    console: Arc<dyn Console>,
}

impl Harness {
    pub fn new(config: HarnessConfig, id: ReplicaId, restore: bool, requested_concurrency: i64) -> Self {
        Self {
            config,
            id,
            restore,
            requested_concurrency,
            transport: None,
            voter: None,
            console: Arc::new(StdConsole),
        }
    }

    /// Replaces the UDP transport, e.g. with an in-memory one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_voter(mut self, voter: Arc<Voter>) -> Self {
        self.voter = Some(voter);
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub async fn run(self) -> Result<RunStatistics> {
        let voter = self.voter.unwrap_or_else(|| Arc::new(Voter::new()));
        let mut lifecycle = ReplicaLifecycle::new(voter, self.config.warm_up());

        let console = self.console;
        console.out("====== Spawn new replica ======");
        if self.restore {
            console.err(RESTORE_BANNER);
        }
        let replica = match self.transport {
            Some(transport) => lifecycle.build_with_transport(&self.config, self.id, self.restore, transport)?,
            None => lifecycle.build(&self.config, self.id, self.restore)?,
        };
        console.out("Done!");

        console.out(&format!("Wait {} seconds to start", self.config.warm_up().as_secs_f64()));
        lifecycle.warm_up().await?;
        lifecycle.start()?;
        console.out("====== start ======");

        let schedule = self.config.schedule_for(self.requested_concurrency.max(1) as usize);
        let pool = ProposerPool::new(self.requested_concurrency, schedule);
        console.out(&running_banner(pool.concurrency()));

        let engine: Arc<dyn Replica> = replica.clone();
        let report = pool.run(engine, CommandFactory::new(self.id)).await?;
        info!(
            "replica {}: {} proposals submitted by {} proposer(s)",
            self.id,
            report.submitted(),
            report.workers.len()
        );

        let stats = StatisticsCollector::new(self.config.settle())
            .settle_and_collect(replica.as_ref())
            .await;
        if stats.in_flight() > 0 {
            warn!("replica {}: {} proposals still undecided at report time", self.id, stats.in_flight());
        }

        replica.shutdown();
        Ok(stats)
    }
}
