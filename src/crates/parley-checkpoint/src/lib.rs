//! # parley-checkpoint
//!
//! Durable, append-only storage for conversation state.
//!
//! Each conversation owns one **checkpoint stream**: an ordered message log
//! plus a sequence of checkpoints recording which engine node was current
//! after every committed turn. The stream, not any in-process object, is the
//! source of truth for a conversation; everything else can be rebuilt from
//! [`CheckpointSaver::load_latest`].
//!
//! ## Backends
//!
//! - [`InMemoryCheckpointSaver`] - process-local, for tests and ephemeral use
//! - [`SqliteCheckpointSaver`] - durable SQLite storage (feature `sqlite`, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use parley_checkpoint::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! let seeded = saver
//!     .seed("conv-42", SeedRequest::new(Message::system("Answer medical questions.")))
//!     .await?;
//!
//! let after_turn = saver
//!     .append(
//!         "conv-42",
//!         AppendRequest::new(
//!             &seeded.id,
//!             vec![Message::user("hello"), Message::assistant("Hi! Ask me anything.")],
//!             EngineNode::Done,
//!         ),
//!     )
//!     .await?;
//!
//! assert_eq!(after_turn.step, 1);
//! assert_eq!(after_turn.state.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod message;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    AppendRequest, Checkpoint, CheckpointMetadata, CheckpointSource, CheckpointSummary,
    ConversationState, EngineNode, PendingInterrupt, SeedRequest, CHECKPOINT_VERSION,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use message::{Message, Role, TokenUsage, ToolCall};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
