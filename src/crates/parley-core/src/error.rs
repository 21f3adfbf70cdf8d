//! Error types for the conversation engine
//!
//! Two families of failure exist and they travel differently:
//!
//! ```text
//! ModelError     - a single model call failed; the turn executor absorbs it
//!                  into a TurnResult (connection-error / internal-error)
//! ToolError      - a single tool call failed; absorbed into the tool message
//!                  (see crate::tool::ToolError)
//! SessionError   - the operation itself could not run; returned to callers
//! ```
//!
//! Only [`SessionError`] ever crosses the public session API.

use parley_checkpoint::CheckpointError;
use std::time::Duration;
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure of one model call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The model or its endpoint does not exist or cannot be reached
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded the configured model timeout
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other provider failure (bad request, auth, malformed payload)
    #[error("model call failed: {0}")]
    Failure(String),
}

impl ModelError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }

    /// Whether the failure is reported to the user as a connection issue.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ModelError::Unavailable(_))
    }
}

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No checkpoint stream exists for the conversation
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// A conversation with this id was already started
    #[error("conversation already exists: {0}")]
    ConversationExists(String),

    /// Another writer committed to the conversation first
    #[error("concurrent write conflict on conversation {0}")]
    ConcurrentWriteConflict(String),

    /// The conversation is suspended on a human-assistance request
    #[error("conversation {conversation_id} is awaiting human input: {query}")]
    AwaitingHuman {
        conversation_id: String,
        query: String,
    },

    /// Resume was called on a conversation that is not suspended
    #[error("conversation {0} is not awaiting human input")]
    NotAwaitingHuman(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(CheckpointError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::ConcurrentWriteConflict(_))
    }
}

impl From<CheckpointError> for SessionError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(id) => SessionError::ConversationNotFound(id),
            CheckpointError::AlreadyExists(id) => SessionError::ConversationExists(id),
            CheckpointError::ConcurrentWrite { thread_id, .. } => {
                SessionError::ConcurrentWriteConflict(thread_id)
            }
            other => SessionError::Checkpoint(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_errors_map_to_session_errors() {
        let err: SessionError = CheckpointError::NotFound("c1".to_string()).into();
        assert!(matches!(err, SessionError::ConversationNotFound(id) if id == "c1"));

        let err: SessionError = CheckpointError::ConcurrentWrite {
            thread_id: "c1".to_string(),
            expected: Some("a".to_string()),
            actual: "b".to_string(),
        }
        .into();
        assert!(err.is_conflict());

        let err: SessionError = CheckpointError::Storage("disk full".to_string()).into();
        assert!(matches!(err, SessionError::Checkpoint(_)));
    }

    #[test]
    fn test_only_unavailable_is_a_connection_issue() {
        assert!(ModelError::unavailable("404").is_unavailable());
        assert!(!ModelError::Timeout(Duration::from_secs(1)).is_unavailable());
        assert!(!ModelError::failure("bad request").is_unavailable());
    }
}
