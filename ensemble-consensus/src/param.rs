use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use ensemble_common::ReplicaId;

use crate::{state_machine::StateMachine, transport::Transport};

/// Everything the engine needs to build a replica.
#[derive(Clone)]
pub struct Param {
    pub addrs: Vec<String>,
    pub replica_id: ReplicaId,
    pub size: u8,
    pub state_machine: Arc<dyn StateMachine>,
    pub transport: Arc<dyn Transport>,
    pub enable_persistent: bool,
    pub restore: bool,
    pub timeout_interval: Duration,
    pub data_dir: PathBuf,
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("addrs", &self.addrs)
            .field("replica_id", &self.replica_id)
            .field("size", &self.size)
            .field("transport", &self.transport.local_addr())
            .field("enable_persistent", &self.enable_persistent)
            .field("restore", &self.restore)
            .field("timeout_interval", &self.timeout_interval)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}
