pub mod engine;
pub mod param;
pub mod replica;
pub mod state_machine;
pub mod transport;

pub use engine::LocalReplica;
pub use param::Param;
pub use replica::{ConflictGauge, Replica};
pub use state_machine::{ExecutionOutput, StateMachine};
pub use transport::{InMemoryTransport, Transport, UdpTransport};
