//! Storage backend trait for conversation checkpoint streams
//!
//! Implementations must uphold the following contract:
//!
//! - **One stream per thread.** `seed` creates it; seeding twice fails with
//!   [`CheckpointError::AlreadyExists`](crate::CheckpointError::AlreadyExists).
//! - **Missing is not empty.** `load_latest` on an unknown thread fails with
//!   [`CheckpointError::NotFound`](crate::CheckpointError::NotFound); a seeded
//!   thread always has at least its step-0 checkpoint.
//! - **Monotonic, atomic appends.** `append` either stores every message and
//!   the new checkpoint, or nothing. History is never truncated.
//! - **Single writer per thread.** When `AppendRequest::parent` is set and is
//!   not the latest checkpoint id, the append fails with
//!   [`CheckpointError::ConcurrentWrite`](crate::CheckpointError::ConcurrentWrite).
//!   Writes to different threads never block each other on the data itself.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use parley_checkpoint::*;
//!
//! struct RedisSaver { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisSaver {
//!     async fn seed(&self, thread_id: &str, request: SeedRequest) -> Result<Checkpoint> { todo!() }
//!     async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> { todo!() }
//!     async fn append(&self, thread_id: &str, request: AppendRequest) -> Result<Checkpoint> { todo!() }
//!     async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> { todo!() }
//!     async fn delete_thread(&self, thread_id: &str) -> Result<()> { todo!() }
//! }
//! ```

use crate::checkpoint::{AppendRequest, Checkpoint, CheckpointSummary, SeedRequest};
use crate::error::{CheckpointError, Result};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Stream of checkpoint summaries, newest first
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<CheckpointSummary>> + Send>>;

/// Durable, append-only store of per-conversation checkpoint streams.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Create a stream holding the system instruction as its only message.
    async fn seed(&self, thread_id: &str, request: SeedRequest) -> Result<Checkpoint>;

    /// Latest checkpoint of a stream.
    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint>;

    /// Extend a stream and record the engine's current node.
    async fn append(&self, thread_id: &str, request: AppendRequest) -> Result<Checkpoint>;

    /// Checkpoints of a stream, newest first.
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream>;

    /// Remove a stream and all its messages.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Whether a stream exists for the thread.
    async fn exists(&self, thread_id: &str) -> Result<bool> {
        match self.load_latest(thread_id).await {
            Ok(_) => Ok(true),
            Err(CheckpointError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
