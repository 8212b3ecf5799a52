use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::{wall_clock, ReplicaId};

/// Opaque client operation. Identity is its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command(pub Vec<u8>);

/// Commands submitted together as one proposal. An empty batch is a no-op.
pub type CommandBatch = Vec<Command>;

impl Command {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        Command(s.into_bytes())
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        Command(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Builds human-readable commands for one replica.
///
/// A payload is unique as long as each `(proposer, counter)` pair is; the
/// timestamp is only there for whoever reads the log.
#[derive(Debug, Clone, Copy)]
pub struct CommandFactory {
    replica: ReplicaId,
}

impl CommandFactory {
    pub fn new(replica: ReplicaId) -> Self {
        Self { replica }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn make(&self, proposer: usize, counter: u64, timestamp: &str) -> Command {
        Command::from(format!(
            "From: {replica}, Proposer: {proposer}, Command: {replica}:{counter}, {timestamp}",
            replica = self.replica,
        ))
    }

    /// Same as [`make`](Self::make), stamped with the current wall clock.
    pub fn make_now(&self, proposer: usize, counter: u64) -> Command {
        self.make(proposer, counter, &wall_clock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_command_format() {
        let factory = CommandFactory::new(ReplicaId(1));
        let cmd = factory.make(2, 20005, "ts");
        assert_eq!(cmd.to_string(), "From: 1, Proposer: 2, Command: 1:20005, ts");
    }

    #[test]
    fn test_distinct_pairs_give_distinct_payloads() {
        let factory = CommandFactory::new(ReplicaId(0));
        let mut seen = HashSet::new();
        for proposer in 0..4usize {
            for i in 0..50u64 {
                let counter = proposer as u64 * 10_000 + i;
                assert!(seen.insert(factory.make(proposer, counter, "same-instant")));
            }
        }
        assert_eq!(seen.len(), 200);
    }

    #[test]
    fn test_display_is_lossy_for_binary() {
        let cmd = Command(vec![0xff, b'a']);
        assert!(cmd.to_string().ends_with('a'));
        assert_eq!(cmd.len(), 2);
    }
}
