//! utils.rs
//!
//! Identity and time helpers shared across the ensemble crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a replica inside the ensemble.
///
/// Replica ids are small dense integers: replica `i` listens on the `i`-th
/// address of the ensemble list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(pub u8);

impl ReplicaId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ReplicaId {
    fn from(id: u8) -> Self {
        ReplicaId(id)
    }
}

impl TryFrom<i64> for ReplicaId {
    type Error = crate::EnsembleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map(ReplicaId)
            .map_err(|_| crate::EnsembleError::Config(format!("replica id {value} out of range")))
    }
}

/// Human-readable wall-clock timestamp. Not used for ordering or uniqueness.
pub fn wall_clock() -> String {
    chrono::Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_id_from_i64() {
        assert_eq!(ReplicaId::try_from(2i64).unwrap(), ReplicaId(2));
        assert!(ReplicaId::try_from(-1i64).is_err());
        assert!(ReplicaId::try_from(256i64).is_err());
    }

    #[test]
    fn test_wall_clock_non_empty() {
        assert!(!wall_clock().is_empty());
    }
}
