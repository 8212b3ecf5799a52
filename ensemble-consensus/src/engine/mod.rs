//! engine
//!
//! In-process replica that stands in for the external consensus engine.
//!
//! It keeps the engine's interface and observable counters but none of its
//! protocol: there are no quorums or ballots here. Proposals are queued, a
//! single decider task drains the queue in rounds, classifies every instance as
//! fast or slow path by asking the state machine whether it conflicts with any
//! other instance still in flight, and applies the round in instance order.

mod counters;
mod pool;
pub mod storage;

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use ensemble_common::{CommandBatch, EnsembleError, ReplicaId, Result};

use crate::{
    param::Param,
    replica::{ConflictGauge, Replica},
    state_machine::StateMachine,
    transport::Transport,
};

pub use counters::PathCounters;
pub use pool::InstancePool;
use storage::{DecisionLog, DecisionPath, DecisionRecord};

#[derive(Debug)]
struct Instance {
    id: u64,
    batch: CommandBatch,
}

#[derive(Debug, Serialize)]
struct Announcement {
    replica: ReplicaId,
    instance: u64,
    commands: usize,
    path: DecisionPath,
}

/// State reachable from both the handle and the decider task.
struct Shared {
    id: ReplicaId,
    state_machine: Arc<dyn StateMachine>,
    transport: Arc<dyn Transport>,
    log: Option<DecisionLog>,
    next_instance: AtomicU64,
    counters: PathCounters,
    pool: Mutex<InstancePool>,
    queue: mpsc::UnboundedSender<Instance>,
}

impl Shared {
    fn submit(&self, batch: CommandBatch) {
        let id = self.next_instance.fetch_add(1, Ordering::SeqCst);
        self.counters.record_proposal();
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(id, batch.clone());
        if self.queue.send(Instance { id, batch }).is_err() {
            error!("replica {}: decider queue closed, instance {} dropped", self.id, id);
        }
    }

    fn decide_round(&self, mut round: Vec<Instance>) {
        round.sort_by_key(|inst| inst.id);
        let in_flight = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();

        let decisions: Vec<(Instance, DecisionPath)> = round
            .into_iter()
            .map(|inst| {
                let conflicted = in_flight
                    .iter()
                    .filter(|(other, _)| *other != inst.id)
                    .any(|(_, other)| self.state_machine.have_conflicts(&inst.batch, other));
                let path = if conflicted { DecisionPath::Slow } else { DecisionPath::Fast };
                (inst, path)
            })
            .collect();

        for (inst, path) in decisions {
            self.counters.record_decision(path == DecisionPath::Slow);
            debug!("replica {}: instance {} decided on {:?} path", self.id, inst.id, path);

            if let Err(e) = self.state_machine.execute(&inst.batch) {
                error!("replica {}: execute instance {} failed: {}", self.id, inst.id, e);
            }
            let announcement = Announcement {
                replica: self.id,
                instance: inst.id,
                commands: inst.batch.len(),
                path,
            };

            if let Some(log) = &self.log {
                let record = DecisionRecord { instance: inst.id, path, batch: inst.batch };
                if let Err(e) = log.append(&record) {
                    error!("replica {}: persist instance {} failed: {}", self.id, inst.id, e);
                }
            }

            match serde_json::to_vec(&announcement) {
                Ok(bytes) => {
                    if let Err(e) = self.transport.broadcast(&bytes) {
                        warn!("replica {}: announce instance {}: {}", self.id, announcement.instance, e);
                    }
                }
                Err(e) => warn!("replica {}: encode announcement: {}", self.id, e),
            }

            self.pool
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(announcement.instance);
        }
    }

    async fn run_decider(
        self: Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<Instance>,
        mut shutdown: oneshot::Receiver<()>,
        timeout_interval: Duration,
    ) {
        info!("replica {}: decider running", self.id);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                next = tokio::time::timeout(timeout_interval, queue.recv()) => match next {
                    Ok(Some(first)) => {
                        let mut round = vec![first];
                        while let Ok(more) = queue.try_recv() {
                            round.push(more);
                        }
                        self.decide_round(round);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        debug!("replica {}: idle for {:?}, proposing no-op", self.id, timeout_interval);
                        self.submit(CommandBatch::new());
                    }
                },
            }
        }
        info!("replica {}: decider stopped", self.id);
    }
}

/// Handle to the in-process replica.
pub struct LocalReplica {
    shared: Arc<Shared>,
    timeout_interval: Duration,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Instance>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    started: AtomicBool,
}

impl LocalReplica {
    pub fn new(param: Param) -> Result<Arc<Self>> {
        if param.size == 0 || param.addrs.len() != param.size as usize {
            return Err(EnsembleError::Replica(format!(
                "ensemble size {} with {} addresses",
                param.size,
                param.addrs.len()
            )));
        }
        if param.replica_id.index() >= param.size as usize {
            return Err(EnsembleError::Replica(format!(
                "replica {} outside ensemble of {}",
                param.replica_id, param.size
            )));
        }
        if param.timeout_interval.is_zero() {
            return Err(EnsembleError::Replica("timeout interval must be positive".into()));
        }

        let counters = PathCounters::new();
        let mut next_instance = 0;
        if param.restore {
            let records = DecisionLog::replay(&param.data_dir, param.replica_id)?;
            let slow = records.iter().filter(|r| r.path == DecisionPath::Slow).count() as u64;
            counters.restore(records.len() as u64 - slow, slow);
            next_instance = records.iter().map(|r| r.instance + 1).max().unwrap_or(0);
            info!(
                "replica {}: restored {} decided instances from {}",
                param.replica_id,
                records.len(),
                param.data_dir.display()
            );
        }

        let log = if param.enable_persistent {
            Some(DecisionLog::open(&param.data_dir, param.replica_id, param.restore)?)
        } else {
            None
        };

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            id: param.replica_id,
            state_machine: param.state_machine,
            transport: param.transport,
            log,
            next_instance: AtomicU64::new(next_instance),
            counters,
            pool: Mutex::new(InstancePool::new()),
            queue: queue_tx,
        };

        Ok(Arc::new(Self {
            shared: Arc::new(shared),
            timeout_interval: param.timeout_interval,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx: Mutex::new(None),
            started: AtomicBool::new(false),
        }))
    }

    /// Instances proposed but not yet decided.
    pub fn pending(&self) -> usize {
        self.shared
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ConflictGauge for LocalReplica {
    fn conflict_rate(&self) -> f64 {
        self.shared.counters.conflict_rate()
    }
}

impl Replica for LocalReplica {
    fn replica_id(&self) -> ReplicaId {
        self.shared.id
    }

    fn propose(&self, batch: CommandBatch) {
        self.shared.submit(batch);
    }

    fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EnsembleError::Start(format!("no async runtime: {e}")))?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EnsembleError::Start(format!("replica {} already started", self.shared.id)));
        }
        let queue = self
            .queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| EnsembleError::Start("decider queue already taken".into()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);

        let shared = Arc::clone(&self.shared);
        runtime.spawn(shared.run_decider(queue, shutdown_rx, self.timeout_interval));
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(sender) = self.shutdown_tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = sender.send(());
        }
    }

    fn total_proposals(&self) -> u64 {
        self.shared.counters.total()
    }

    fn fast_path_count(&self) -> u64 {
        self.shared.counters.fast()
    }

    fn slow_path_count(&self) -> u64 {
        self.shared.counters.slow()
    }
}

impl fmt::Debug for LocalReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalReplica")
            .field("id", &self.shared.id)
            .field("total", &self.shared.counters.total())
            .field("fast", &self.shared.counters.fast())
            .field("slow", &self.shared.counters.slow())
            .field("pending", &self.pending())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for LocalReplica {
    fn drop(&mut self) {
        self.shutdown();
    }
}
