//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint stream exists for the thread
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// A stream for the thread was already seeded
    #[error("Checkpoint stream already exists: {0}")]
    AlreadyExists(String),

    /// The writer's parent checkpoint is no longer the latest one
    #[error("Concurrent write on thread {thread_id}: expected parent {expected:?}, latest is {actual}")]
    ConcurrentWrite {
        thread_id: String,
        expected: Option<String>,
        actual: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// True when the write lost a race against another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CheckpointError::ConcurrentWrite { .. })
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}
