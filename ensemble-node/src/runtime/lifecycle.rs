//! Construction, warm-up and start of the local replica.
//!
//! `Unstarted -> Built -> WarmingUp -> Running`. A failed build or start is
//! terminal: the caller is expected to abort, nothing is retried.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use ensemble_common::{EnsembleError, ReplicaId, Result};
use ensemble_consensus::{LocalReplica, Param, Replica, Transport, UdpTransport};

use crate::{config::HarnessConfig, voter::Voter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Built,
    WarmingUp,
    Running,
    BuildFailed,
    StartFailed,
}

pub struct ReplicaLifecycle {
    state: LifecycleState,
    voter: Arc<Voter>,
    warm_up: Duration,
    replica: Option<Arc<LocalReplica>>,
}

impl ReplicaLifecycle {
    pub fn new(voter: Arc<Voter>, warm_up: Duration) -> Self {
        Self { state: LifecycleState::Unstarted, voter, warm_up, replica: None }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn replica(&self) -> Option<&Arc<LocalReplica>> {
        self.replica.as_ref()
    }

    /// Builds the UDP transport for `id` and then the replica on top of it.
    pub fn build(&mut self, config: &HarnessConfig, id: ReplicaId, restore: bool) -> Result<Arc<LocalReplica>> {
        self.expect_state(LifecycleState::Unstarted, "build")?;
        let transport = config
            .ensemble_size()
            .and_then(|size| UdpTransport::new(&config.addrs, id, size))
            .map_err(|e| self.fail(LifecycleState::BuildFailed, e))?;
        self.build_with_transport(config, id, restore, Arc::new(transport))
    }

    pub fn build_with_transport(
        &mut self,
        config: &HarnessConfig,
        id: ReplicaId,
        restore: bool,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<LocalReplica>> {
        self.expect_state(LifecycleState::Unstarted, "build")?;
        let size = config
            .ensemble_size()
            .map_err(|e| self.fail(LifecycleState::BuildFailed, e))?;

        let param = Param {
            addrs: config.addrs.clone(),
            replica_id: id,
            size,
            state_machine: self.voter.clone(),
            transport,
            enable_persistent: config.enable_persistent,
            restore,
            timeout_interval: config.proposal_timeout(),
            data_dir: config.data_dir.clone(),
        };
        info!("building replica: {:?}", param);

        let replica = LocalReplica::new(param).map_err(|e| self.fail(LifecycleState::BuildFailed, e))?;
        // the replica must be attached before it can call back into the voter
        self.voter
            .set_replica(&replica)
            .map_err(|e| self.fail(LifecycleState::BuildFailed, e))?;

        self.replica = Some(Arc::clone(&replica));
        self.state = LifecycleState::Built;
        Ok(replica)
    }

    /// Gives the rest of the ensemble time to come up. A timing heuristic only.
    pub async fn warm_up(&mut self) -> Result<()> {
        self.expect_state(LifecycleState::Built, "warm up")?;
        self.state = LifecycleState::WarmingUp;
        tokio::time::sleep(self.warm_up).await;
        Ok(())
    }

    pub fn start(&mut self) -> Result<Arc<LocalReplica>> {
        self.expect_state(LifecycleState::WarmingUp, "start")?;
        let replica = self
            .replica
            .clone()
            .ok_or_else(|| EnsembleError::Start("no replica built".into()))?;
        replica.start().map_err(|e| self.fail(LifecycleState::StartFailed, e))?;
        self.state = LifecycleState::Running;
        Ok(replica)
    }

    fn expect_state(&self, expected: LifecycleState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EnsembleError::Other(format!(
                "cannot {} replica in state {:?}",
                action, self.state
            )))
        }
    }

    fn fail(&mut self, state: LifecycleState, err: EnsembleError) -> EnsembleError {
        error!("replica lifecycle entered {:?}: {}", state, err);
        self.state = state;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_consensus::InMemoryTransport;

    fn test_config(dir: &std::path::Path) -> HarnessConfig {
        HarnessConfig {
            addrs: vec!["127.0.0.1:0".into(), "127.0.0.1:0".into(), "127.0.0.1:0".into()],
            enable_persistent: false,
            data_dir: dir.to_path_buf(),
            warm_up_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let voter = Arc::new(Voter::new());
        let mut lifecycle = ReplicaLifecycle::new(voter.clone(), config.warm_up());
        assert_eq!(lifecycle.state(), LifecycleState::Unstarted);

        lifecycle
            .build_with_transport(&config, ReplicaId(0), false, Arc::new(InMemoryTransport::new()))
            .unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Built);
        assert!(voter.has_replica());

        lifecycle.warm_up().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::WarmingUp);

        let replica = lifecycle.start().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        replica.shutdown();
    }

    #[tokio::test]
    async fn test_udp_build_binds_local_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut lifecycle = ReplicaLifecycle::new(Arc::new(Voter::new()), Duration::ZERO);
        lifecycle.build(&config, ReplicaId(2), false).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Built);
    }

    #[test]
    fn test_transport_failure_is_build_failed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut lifecycle = ReplicaLifecycle::new(Arc::new(Voter::new()), Duration::ZERO);

        let err = lifecycle.build(&config, ReplicaId(7), false).unwrap_err();
        assert!(matches!(err, EnsembleError::Transport(_)));
        assert!(err.is_fatal());
        assert_eq!(lifecycle.state(), LifecycleState::BuildFailed);
        assert!(lifecycle.replica().is_none());
    }

    #[test]
    fn test_replica_failure_is_build_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.proposal_timeout_ms = 0;
        let mut lifecycle = ReplicaLifecycle::new(Arc::new(Voter::new()), Duration::ZERO);

        let err = lifecycle
            .build_with_transport(&config, ReplicaId(0), false, Arc::new(InMemoryTransport::new()))
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Replica(_)));
        assert_eq!(lifecycle.state(), LifecycleState::BuildFailed);
    }

    #[test]
    fn test_start_failure_is_terminal() {
        // no tokio runtime here, so the replica cannot start its decider
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut lifecycle = ReplicaLifecycle::new(Arc::new(Voter::new()), Duration::ZERO);
        lifecycle
            .build_with_transport(&config, ReplicaId(0), false, Arc::new(InMemoryTransport::new()))
            .unwrap();
        lifecycle.state = LifecycleState::WarmingUp;

        let err = lifecycle.start().unwrap_err();
        assert!(matches!(err, EnsembleError::Start(_)));
        assert_eq!(lifecycle.state(), LifecycleState::StartFailed);
        assert!(lifecycle.start().is_err());
    }

    #[tokio::test]
    async fn test_start_requires_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut lifecycle = ReplicaLifecycle::new(Arc::new(Voter::new()), Duration::ZERO);
        lifecycle
            .build_with_transport(&config, ReplicaId(0), false, Arc::new(InMemoryTransport::new()))
            .unwrap();
        assert!(lifecycle.start().is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Built);
    }
}
