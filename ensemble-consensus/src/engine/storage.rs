//! Append-only record of decided instances.
//!
//! One JSON object per line, so a torn final write only loses the last record
//! instead of the whole file.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use ensemble_common::{CommandBatch, EnsembleError, ReplicaId, Result};

const LOG_FILE: &str = "decided.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    Fast,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub instance: u64,
    pub path: DecisionPath,
    pub batch: CommandBatch,
}

#[derive(Debug)]
pub struct DecisionLog {
    path: PathBuf,
    file: Mutex<File>,
}

/// `<data_dir>/replica-<id>`
pub fn replica_dir(data_dir: &Path, id: ReplicaId) -> PathBuf {
    data_dir.join(format!("replica-{}", id))
}

impl DecisionLog {
    /// Opens the log for appending. Unless `keep` is set, any previous
    /// contents are discarded. A kept log always ends on a line boundary
    /// before anything new is appended.
    pub fn open(data_dir: &Path, id: ReplicaId, keep: bool) -> Result<Self> {
        let dir = replica_dir(data_dir, id);
        fs::create_dir_all(&dir).map_err(|e| {
            EnsembleError::Persistence(format!("create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(keep)
            .append(keep)
            .write(true)
            .truncate(!keep)
            .open(&path)
            .map_err(|e| EnsembleError::Persistence(format!("open {}: {}", path.display(), e)))?;
        if keep {
            seal_tail(&mut file, &path)?;
        }
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &DecisionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Reads back every record. A missing log is an empty history; a corrupt
    /// line anywhere but at the tail is an error.
    pub fn replay(data_dir: &Path, id: ReplicaId) -> Result<Vec<DecisionRecord>> {
        let path = replica_dir(data_dir, id).join(LOG_FILE);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EnsembleError::Persistence(format!("open {}: {}", path.display(), e)))
            }
        };

        let lines = BufReader::new(file).lines().collect::<std::io::Result<Vec<_>>>()?;
        let last = lines.len().saturating_sub(1);
        let mut records = Vec::with_capacity(lines.len());
        for (n, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DecisionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if n == last => {
                    warn!("dropping torn tail record in {}: {}", path.display(), e);
                }
                Err(e) => {
                    return Err(EnsembleError::Persistence(format!(
                        "{} line {}: {}",
                        path.display(),
                        n + 1,
                        e
                    )))
                }
            }
        }
        Ok(records)
    }
}

/// Terminates an unterminated last line: a complete record gets its newline,
/// a torn fragment is cut off.
fn seal_tail(file: &mut File, path: &Path) -> Result<()> {
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    let boundary = contents.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    if boundary == contents.len() {
        return Ok(());
    }

    let tail = &contents[boundary..];
    if serde_json::from_slice::<DecisionRecord>(tail).is_ok() {
        file.write_all(b"\n")?;
    } else {
        warn!(
            "truncating {} torn bytes at the end of {}",
            tail.len(),
            path.display()
        );
        file.set_len(boundary as u64)?;
    }
    file.flush()?;
    Ok(())
}
