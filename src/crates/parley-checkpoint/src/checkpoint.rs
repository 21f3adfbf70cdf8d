//! Snapshot format of a conversation checkpoint stream.
//!
//! Every conversation owns exactly one stream. The stream is an append-only
//! log of [`Message`]s plus a sequence of checkpoints, each of which names a
//! prefix of that log and the engine node that was current when it was
//! written.
//!
//! ```text
//! messages:    [sys] [user] [asst+calls] [tool] [asst] [user] [asst]
//!                │                               │             │
//! checkpoints:  step 0 (seed)                 step 1        step 2
//!               node=query_or_respond         node=done     node=done
//! ```
//!
//! # Checkpoint Sources
//!
//! | Source   | Written by                              |
//! |----------|-----------------------------------------|
//! | `Seed`   | conversation start (system instruction) |
//! | `Turn`   | a completed or suspended user turn      |
//! | `Resume` | human input delivered to a suspension   |

use crate::message::{Message, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Snapshot format version written into every checkpoint.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Position of the turn executor when a checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineNode {
    /// Deciding between a direct answer and tool calls
    QueryOrRespond,
    /// Running the tool calls of the last assistant message
    ToolDispatch,
    /// Producing the final answer from the trailing tool results
    Generate,
    /// Suspended until an operator supplies input
    HumanAssistance,
    /// Turn finished
    Done,
}

impl EngineNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineNode::QueryOrRespond => "query_or_respond",
            EngineNode::ToolDispatch => "tool_dispatch",
            EngineNode::Generate => "generate",
            EngineNode::HumanAssistance => "human_assistance",
            EngineNode::Done => "done",
        }
    }

    /// Whether a new user turn may start from this node.
    pub fn accepts_user_turn(&self) -> bool {
        matches!(self, EngineNode::QueryOrRespond | EngineNode::Done)
    }
}

impl std::fmt::Display for EngineNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineNode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query_or_respond" => Ok(EngineNode::QueryOrRespond),
            "tool_dispatch" => Ok(EngineNode::ToolDispatch),
            "generate" => Ok(EngineNode::Generate),
            "human_assistance" => Ok(EngineNode::HumanAssistance),
            "done" => Ok(EngineNode::Done),
            other => Err(format!("unknown engine node: {}", other)),
        }
    }
}

/// Ordered message history of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Human-assistance request a suspended conversation is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Id of the `human_assistance` tool call to answer
    pub tool_call_id: String,
    pub query: String,
    pub raised_at: DateTime<Utc>,
}

/// Origin of a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    Seed,
    Turn,
    Resume,
}

/// Metadata recorded alongside each checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,

    /// Terminal status of the turn that produced this checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Usage of the final model call of the turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource) -> Self {
        Self {
            source,
            status: None,
            usage: None,
            pending_interrupt: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_pending_interrupt(mut self, interrupt: PendingInterrupt) -> Self {
        self.pending_interrupt = Some(interrupt);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Latest snapshot of a conversation as returned by `load_latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version
    pub v: u32,
    pub id: String,
    pub thread_id: String,
    /// Monotonic position in the stream; the seed is step 0
    pub step: u64,
    pub ts: DateTime<Utc>,
    pub node: EngineNode,
    pub state: ConversationState,

    /// Display-only greeting recorded at seed time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<Message>,

    /// Opaque per-conversation settings recorded at seed time
    #[serde(default)]
    pub settings: Value,

    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn pending_interrupt(&self) -> Option<&PendingInterrupt> {
        if self.node == EngineNode::HumanAssistance {
            self.metadata.pending_interrupt.as_ref()
        } else {
            None
        }
    }
}

/// Listing entry for one checkpoint of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub thread_id: String,
    pub step: u64,
    pub ts: DateTime<Utc>,
    pub node: EngineNode,
    /// Length of the message prefix this checkpoint covers
    pub message_count: usize,
    pub metadata: CheckpointMetadata,
}

/// Initial contents of a new stream.
#[derive(Debug, Clone)]
pub struct SeedRequest {
    pub system: Message,
    pub welcome: Option<Message>,
    pub settings: Value,
}

impl SeedRequest {
    pub fn new(system: Message) -> Self {
        Self {
            system,
            welcome: None,
            settings: Value::Null,
        }
    }

    pub fn with_welcome(mut self, welcome: Message) -> Self {
        self.welcome = Some(welcome);
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }
}

/// A batch of messages to extend a stream with.
///
/// `parent` is the id of the checkpoint the writer loaded before computing
/// `messages`. Backends reject the write when it is no longer the latest.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub parent: Option<String>,
    pub messages: Vec<Message>,
    pub node: EngineNode,
    pub metadata: CheckpointMetadata,
}

impl AppendRequest {
    pub fn new(parent: impl Into<String>, messages: Vec<Message>, node: EngineNode) -> Self {
        Self {
            parent: Some(parent.into()),
            messages,
            node,
            metadata: CheckpointMetadata::new(CheckpointSource::Turn),
        }
    }

    /// Append without checking the parent.
    pub fn unconditional(messages: Vec<Message>, node: EngineNode) -> Self {
        Self {
            parent: None,
            messages,
            node,
            metadata: CheckpointMetadata::new(CheckpointSource::Turn),
        }
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

pub(crate) fn new_checkpoint_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reject a write whose parent is not the latest checkpoint.
pub(crate) fn ensure_parent(
    thread_id: &str,
    expected: Option<&str>,
    latest: &str,
) -> crate::error::Result<()> {
    match expected {
        Some(parent) if parent != latest => Err(crate::error::CheckpointError::ConcurrentWrite {
            thread_id: thread_id.to_string(),
            expected: Some(parent.to_string()),
            actual: latest.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_node_round_trips_through_str() {
        for node in [
            EngineNode::QueryOrRespond,
            EngineNode::ToolDispatch,
            EngineNode::Generate,
            EngineNode::HumanAssistance,
            EngineNode::Done,
        ] {
            assert_eq!(node.as_str().parse::<EngineNode>().unwrap(), node);
        }
        assert!("chatbot".parse::<EngineNode>().is_err());
    }

    #[test]
    fn test_accepts_user_turn() {
        assert!(EngineNode::Done.accepts_user_turn());
        assert!(EngineNode::QueryOrRespond.accepts_user_turn());
        assert!(!EngineNode::HumanAssistance.accepts_user_turn());
    }

    #[test]
    fn test_metadata_extra_is_flattened() {
        let metadata = CheckpointMetadata::new(CheckpointSource::Turn)
            .with_status("answered")
            .with_extra("model", json!("llama-3.1-8b-instant"));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["source"], "turn");
        assert_eq!(value["status"], "answered");
        assert_eq!(value["model"], "llama-3.1-8b-instant");

        let back: CheckpointMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_pending_interrupt_only_at_human_assistance() {
        let interrupt = PendingInterrupt {
            tool_call_id: "call_1".to_string(),
            query: "Is this dosage safe?".to_string(),
            raised_at: Utc::now(),
        };
        let mut checkpoint = Checkpoint {
            v: CHECKPOINT_VERSION,
            id: new_checkpoint_id(),
            thread_id: "t".to_string(),
            step: 1,
            ts: Utc::now(),
            node: EngineNode::HumanAssistance,
            state: ConversationState::default(),
            welcome: None,
            settings: Value::Null,
            metadata: CheckpointMetadata::new(CheckpointSource::Turn)
                .with_pending_interrupt(interrupt.clone()),
        };
        assert_eq!(checkpoint.pending_interrupt(), Some(&interrupt));

        checkpoint.node = EngineNode::Done;
        assert!(checkpoint.pending_interrupt().is_none());
    }
}
