//! In-memory checkpoint saver
//!
//! Keeps every stream in a process-local map. Intended for tests and for
//! single-process deployments that do not need durability; the SQLite saver
//! implements the same contract on disk.

use crate::checkpoint::{
    ensure_parent, new_checkpoint_id, AppendRequest, Checkpoint, CheckpointMetadata,
    CheckpointSource, CheckpointSummary, ConversationState, EngineNode, SeedRequest,
    CHECKPOINT_VERSION,
};
use crate::error::{CheckpointError, Result};
use crate::message::Message;
use crate::traits::{CheckpointSaver, CheckpointStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    id: String,
    step: u64,
    ts: DateTime<Utc>,
    node: EngineNode,
    message_count: usize,
    metadata: CheckpointMetadata,
}

#[derive(Debug, Clone)]
struct ThreadLog {
    messages: Vec<Message>,
    checkpoints: Vec<CheckpointEntry>,
    welcome: Option<Message>,
    settings: Value,
}

impl ThreadLog {
    fn latest(&self) -> Result<&CheckpointEntry> {
        self.checkpoints
            .last()
            .ok_or_else(|| CheckpointError::Invalid("stream has no checkpoints".to_string()))
    }

    fn snapshot(&self, thread_id: &str, entry: &CheckpointEntry) -> Checkpoint {
        Checkpoint {
            v: CHECKPOINT_VERSION,
            id: entry.id.clone(),
            thread_id: thread_id.to_string(),
            step: entry.step,
            ts: entry.ts,
            node: entry.node,
            state: ConversationState::new(self.messages[..entry.message_count].to_vec()),
            welcome: self.welcome.clone(),
            settings: self.settings.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, ThreadLog>>>;

/// In-memory checkpoint saver implementation
///
/// Appends hold the write lock for the whole check-and-extend, so the parent
/// check and the write cannot interleave with another writer.
///
/// # Example
///
/// ```rust
/// use parley_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver, Message, SeedRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let saver = InMemoryCheckpointSaver::new();
/// saver
///     .seed("conv-1", SeedRequest::new(Message::system("You are a medical librarian.")))
///     .await?;
///
/// let latest = saver.load_latest("conv-1").await?;
/// assert_eq!(latest.step, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|log| log.checkpoints.len())
            .sum()
    }

    /// Clear all streams
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn seed(&self, thread_id: &str, request: SeedRequest) -> Result<Checkpoint> {
        let mut storage = self.storage.write().await;
        if storage.contains_key(thread_id) {
            return Err(CheckpointError::AlreadyExists(thread_id.to_string()));
        }

        let entry = CheckpointEntry {
            id: new_checkpoint_id(),
            step: 0,
            ts: Utc::now(),
            node: EngineNode::QueryOrRespond,
            message_count: 1,
            metadata: CheckpointMetadata::new(CheckpointSource::Seed),
        };
        let log = ThreadLog {
            messages: vec![request.system],
            checkpoints: vec![entry.clone()],
            welcome: request.welcome,
            settings: request.settings,
        };
        let checkpoint = log.snapshot(thread_id, &entry);
        storage.insert(thread_id.to_string(), log);

        Ok(checkpoint)
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        let storage = self.storage.read().await;
        let log = storage
            .get(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        let entry = log.latest()?;

        Ok(log.snapshot(thread_id, entry))
    }

    async fn append(&self, thread_id: &str, request: AppendRequest) -> Result<Checkpoint> {
        let mut storage = self.storage.write().await;
        let log = storage
            .get_mut(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;

        let latest = log.latest()?;
        ensure_parent(thread_id, request.parent.as_deref(), &latest.id)?;

        let entry = CheckpointEntry {
            id: new_checkpoint_id(),
            step: latest.step + 1,
            ts: Utc::now(),
            node: request.node,
            message_count: log.messages.len() + request.messages.len(),
            metadata: request.metadata,
        };
        log.messages.extend(request.messages);
        log.checkpoints.push(entry.clone());

        Ok(log.snapshot(thread_id, &entry))
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let log = storage
            .get(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;

        let summaries: Vec<Result<CheckpointSummary>> = log
            .checkpoints
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|entry| {
                Ok(CheckpointSummary {
                    id: entry.id.clone(),
                    thread_id: thread_id.to_string(),
                    step: entry.step,
                    ts: entry.ts,
                    node: entry.node,
                    message_count: entry.message_count,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(summaries)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(thread_id);
        Ok(())
    }

    async fn exists(&self, thread_id: &str) -> Result<bool> {
        Ok(self.storage.read().await.contains_key(thread_id))
    }
}
