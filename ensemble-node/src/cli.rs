use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use ensemble_common::{ReplicaId, Result};

#[derive(Parser, Debug, Clone)]
#[command(name = "ensemble-node")]
#[command(about = "Runs one ensemble replica and drives it with synthetic proposals")]
pub struct Args {
    /// id of the server
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub id: i64,

    /// recover from persisted state instead of starting fresh
    #[arg(long)]
    pub restore: bool,

    /// number of concurrent proposers (1 = sequential mode)
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub concurrent: i64,

    /// JSON harness configuration; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// write the effective configuration to FILE before running
    #[arg(long, value_name = "FILE")]
    pub write_config: Option<PathBuf>,
}

/// What the binary does with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// No replica id: print usage and exit without building anything.
    Usage,
    Run(ReplicaId),
}

impl Args {
    pub fn launch(&self) -> Result<Launch> {
        Ok(match self.replica_id()? {
            Some(id) => Launch::Run(id),
            None => Launch::Usage,
        })
    }

    pub fn usage() -> String {
        Args::command().render_help().to_string()
    }

    /// `Ok(None)` when no id was given; an error when it does not fit a replica id.
    pub fn replica_id(&self) -> Result<Option<ReplicaId>> {
        if self.id < 0 {
            return Ok(None);
        }
        ReplicaId::try_from(self.id).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["ensemble-node"]);
        assert_eq!(args.id, -1);
        assert!(!args.restore);
        assert_eq!(args.concurrent, 1);
        assert!(args.replica_id().unwrap().is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["ensemble-node", "--id", "1", "--restore", "--concurrent", "4"]);
        assert_eq!(args.replica_id().unwrap(), Some(ReplicaId(1)));
        assert!(args.restore);
        assert_eq!(args.concurrent, 4);
    }

    #[test]
    fn test_negative_values_parse() {
        let args = Args::parse_from(["ensemble-node", "--id", "-1", "--concurrent", "-3"]);
        assert!(args.replica_id().unwrap().is_none());
        assert_eq!(args.concurrent, -3);
    }

    #[test]
    fn test_missing_id_launches_usage_only() {
        for argv in [vec!["ensemble-node"], vec!["ensemble-node", "--id", "-1", "--restore"]] {
            let args = Args::parse_from(argv);
            assert_eq!(args.launch().unwrap(), Launch::Usage);
        }
        let usage = Args::usage();
        assert!(usage.contains("--id"));
        assert!(usage.contains("--concurrent"));
    }

    #[test]
    fn test_valid_id_launches_run() {
        let args = Args::parse_from(["ensemble-node", "--id", "2"]);
        assert_eq!(args.launch().unwrap(), Launch::Run(ReplicaId(2)));
    }

    #[test]
    fn test_id_too_large_is_a_config_error() {
        let args = Args::parse_from(["ensemble-node", "--id", "300"]);
        assert!(matches!(args.replica_id(), Err(ensemble_common::EnsembleError::Config(_))));
    }
}
