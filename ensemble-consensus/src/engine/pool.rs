use std::collections::BTreeMap;

use ensemble_common::CommandBatch;

/// Instances proposed locally and not yet decided, keyed by instance number.
#[derive(Debug, Default, Clone)]
pub struct InstancePool {
    pending: BTreeMap<u64, CommandBatch>,
}

impl InstancePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instance: u64, batch: CommandBatch) {
        if self.pending.insert(instance, batch).is_some() {
            tracing::warn!("instance {} was already pending", instance);
        }
    }

    pub fn remove(&mut self, instance: u64) -> Option<CommandBatch> {
        self.pending.remove(&instance)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Copy of everything in flight, in instance order.
    pub fn snapshot(&self) -> Vec<(u64, CommandBatch)> {
        self.pending
            .iter()
            .map(|(id, batch)| (*id, batch.clone()))
            .collect()
    }
}
