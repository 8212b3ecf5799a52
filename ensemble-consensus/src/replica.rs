use ensemble_common::{CommandBatch, ReplicaId, Result};

/// Live conflict-rate reading, in `[0, 1]`.
pub trait ConflictGauge: Send + Sync {
    fn conflict_rate(&self) -> f64;
}

/// Handle to a running consensus replica.
///
/// `propose` never waits for consensus; the counters are cumulative since the
/// replica was built (or restored).
pub trait Replica: ConflictGauge {
    fn replica_id(&self) -> ReplicaId;

    fn propose(&self, batch: CommandBatch);

    fn start(&self) -> Result<()>;

    fn shutdown(&self);

    fn total_proposals(&self) -> u64;

    fn fast_path_count(&self) -> u64;

    fn slow_path_count(&self) -> u64;
}
