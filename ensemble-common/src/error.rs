use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Replica error: {0}")]
    Replica(String),

    #[error("Start error: {0}")]
    Start(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EnsembleError>;

impl EnsembleError {
    /// Startup failures terminate the process; everything else is reported.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnsembleError::Transport(_) | EnsembleError::Replica(_) | EnsembleError::Start(_)
        )
    }
}
