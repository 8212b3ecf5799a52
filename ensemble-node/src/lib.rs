pub mod cli;
pub mod config;
pub mod runtime;
pub mod voter;

pub use config::{HarnessConfig, Schedule};
pub use runtime::harness::Harness;
pub use runtime::stats::RunStatistics;
pub use voter::Voter;
