//! Shared types for the ensemble workspace: replica identities, commands,
//! the command factory and the error taxonomy.

pub mod command;
pub mod error;
pub mod utils;

pub use command::{Command, CommandBatch, CommandFactory};
pub use error::{EnsembleError, Result};
pub use utils::ReplicaId;
