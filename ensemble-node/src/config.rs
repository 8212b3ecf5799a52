use std::{fs, path::{Path, PathBuf}, time::Duration};

use serde::{Deserialize, Serialize};

use ensemble_common::{EnsembleError, Result};

/// Counter offset between consecutive proposers. Each proposer owns
/// `[p * STRIDE, (p + 1) * STRIDE)`.
pub const PROPOSER_COUNTER_STRIDE: u64 = 10_000;

/// How many commands one proposer submits and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub iterations: u64,
    pub interval_ms: u64,
}

impl Schedule {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub addrs: Vec<String>,
    pub enable_persistent: bool,
    pub data_dir: PathBuf,
    pub proposal_timeout_ms: u64,
    pub warm_up_ms: u64,
    pub settle_ms: u64,
    /// Used when more than one proposer runs.
    pub concurrent: Schedule,
    /// Used with a single proposer.
    pub sequential: Schedule,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            addrs: vec![":9000".into(), ":9001".into(), ":9002".into()],
            enable_persistent: true,
            data_dir: PathBuf::from("data"),
            proposal_timeout_ms: 1_000,
            warm_up_ms: 1_000,
            settle_ms: 5_000,
            concurrent: Schedule { iterations: 1_000, interval_ms: 50 },
            sequential: Schedule { iterations: 20, interval_ms: 1_000 },
        }
    }
}

impl HarnessConfig {
    pub fn schedule_for(&self, concurrency: usize) -> Schedule {
        if concurrency > 1 {
            self.concurrent
        } else {
            self.sequential
        }
    }

    pub fn ensemble_size(&self) -> Result<u8> {
        u8::try_from(self.addrs.len())
            .map_err(|_| EnsembleError::Config(format!("{} addresses exceed 255", self.addrs.len())))
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.addrs.is_empty() {
            return Err(EnsembleError::Config("no ensemble addresses".into()));
        }
        self.ensemble_size()?;
        if self.proposal_timeout_ms == 0 {
            return Err(EnsembleError::Config("proposal_timeout_ms must be positive".into()));
        }
        for (name, schedule) in [("concurrent", self.concurrent), ("sequential", self.sequential)] {
            if schedule.iterations > PROPOSER_COUNTER_STRIDE {
                return Err(EnsembleError::Config(format!(
                    "{name} iterations {} would overlap the next proposer's counters (max {})",
                    schedule.iterations, PROPOSER_COUNTER_STRIDE
                )));
            }
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let parsed = serde_json::from_str::<HarnessConfig>(&data)?;
        parsed.validate()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_demo() {
        let config = HarnessConfig::default();
        assert_eq!(config.ensemble_size().unwrap(), 3);
        assert_eq!(config.schedule_for(1), Schedule { iterations: 20, interval_ms: 1_000 });
        assert_eq!(config.schedule_for(4), Schedule { iterations: 1_000, interval_ms: 50 });
        assert_eq!(config.settle(), Duration::from_secs(5));
        assert_eq!(config.warm_up(), Duration::from_secs(1));
        assert_eq!(config.proposal_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = HarnessConfig::default();
        config.settle_ms = 10;
        config.save_to_file(file.path()).unwrap();

        let loaded = HarnessConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{ "settle_ms": 0, "addrs": [":7000"] }"#).unwrap();

        let loaded = HarnessConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.settle_ms, 0);
        assert_eq!(loaded.addrs, vec![":7000".to_string()]);
        assert_eq!(loaded.sequential, HarnessConfig::default().sequential);
    }

    #[test]
    fn test_overlapping_counters_rejected() {
        let mut config = HarnessConfig::default();
        config.concurrent.iterations = PROPOSER_COUNTER_STRIDE + 1;
        assert!(matches!(config.validate(), Err(EnsembleError::Config(_))));
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        let config = HarnessConfig { addrs: Vec::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(EnsembleError::Config(_))));
    }
}
