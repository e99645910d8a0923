use thiserror::Error;

use super::RunState;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for the run status record
pub trait StatusStore: Send + Sync {
    /// Replace the stored record. Readers must never observe a partial write.
    fn save(&self, state: &RunState) -> Result<(), StatusError>;

    /// Read the stored record, `None` if nothing was written yet.
    fn load(&self) -> Result<Option<RunState>, StatusError>;
}
