use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("Fetch returned no items")]
    EmptyFetch,

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run lock conflict: another run is in progress for this topic")]
    RunLockConflict,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RadarError {
    /// Short machine-readable tag, used in alert payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RadarError::EmptyFetch => "empty_fetch",
            RadarError::Fetch(_) => "fetch",
            RadarError::Oracle(_) => "oracle",
            RadarError::Store(_) => "store",
            RadarError::Config(_) => "config",
            RadarError::RunLockConflict => "run_lock_conflict",
            RadarError::Anyhow(_) => "other",
        }
    }
}
