pub mod harness;
pub mod lifecycle;
pub mod proposer;
pub mod stats;
