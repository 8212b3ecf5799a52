use ensemble_common::{Command, Result};

/// Result value produced by applying one command.
pub type ExecutionOutput = Vec<u8>;

/// Callback surface the engine invokes once it has ordered commands.
///
/// Both methods may be called concurrently from any engine thread.
pub trait StateMachine: Send + Sync {
    /// Applies a decided batch. An empty batch is a no-op proposal.
    fn execute(&self, batch: &[Command]) -> Result<Vec<ExecutionOutput>>;

    /// Returns true when the two batches do not commute and must be ordered.
    fn have_conflicts(&self, a: &[Command], b: &[Command]) -> bool;
}
