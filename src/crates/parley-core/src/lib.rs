//! # parley-core - Tool-augmented conversation engine
//!
//! `parley-core` runs multi-turn, multi-tenant conversations between end
//! users and a configurable AI agent. Each turn may consult remote tools over
//! MCP, may pause for a human operator, and is persisted in a checkpoint
//! stream so it survives restarts.
//!
//! ## Components
//!
//! | Component           | Role                                                        |
//! |---------------------|-------------------------------------------------------------|
//! | [`SessionManager`]  | start, advance, resume and inspect conversations            |
//! | [`TurnExecutor`]    | the per-turn state machine (see [`engine`])                 |
//! | [`ToolRegistry`]    | remote tools discovered at startup + `human_assistance`     |
//! | [`ChatModel`]       | the model seam; providers live in the `llm` crate           |
//! | `CheckpointSaver`   | durable per-conversation streams (`parley-checkpoint`)      |
//! | [`UsageSink`]       | receives per-turn token usage                               |
//!
//! ## Turn lifecycle
//!
//! ```text
//! send_turn(id, text)
//!   ├─ lock conversation (queue or reject)
//!   ├─ load latest checkpoint
//!   ├─ QueryOrRespond ─▶ [ToolDispatch ─▶ Generate] ─▶ Done | HumanAssistance
//!   ├─ append all new messages + checkpoint in one write
//!   └─ report usage, return TurnResult
//! ```
//!
//! Model failures never escape as errors: they end the turn with a fixed
//! user-facing message and a [`TurnStatus`] of `ConnectionError` or
//! `InternalError`. Tool failures become tool messages the model can read.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley_checkpoint::SqliteCheckpointSaver;
//! use parley_core::tool::McpHttpTransport;
//! use parley_core::{AgentConfig, EngineConfig, SessionManager, ToolRegistry, TurnExecutor};
//! use std::sync::Arc;
//!
//! # async fn run(model: Arc<dyn parley_core::ChatModel>) -> anyhow::Result<()> {
//! let saver = SqliteCheckpointSaver::connect("parley.db").await?;
//! let tools = ToolRegistry::builder()
//!     .discover(Arc::new(McpHttpTransport::new("med_tools", "http://localhost:8001/mcp")))
//!     .await
//!     .build();
//!
//! let executor = TurnExecutor::new(model, Arc::new(tools), EngineConfig::default());
//! let sessions = SessionManager::new(Arc::new(saver), Arc::new(executor));
//!
//! let agent = AgentConfig::new("You are a medical research assistant.")
//!     .with_welcome("Hello! Ask me about recent literature.")
//!     .with_creativity(0.3);
//! let conversation = sessions.start_conversation(&agent).await?;
//!
//! let result = sessions
//!     .send_turn(&conversation.conversation_id, "Recent trials on asthma biologics?")
//!     .await?;
//! println!("[{}] {}", result.status, result.message.content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod ledger;
pub mod llm;
pub mod session;
pub mod tool;

pub use config::{BusyPolicy, EngineConfig};
pub use engine::{
    transition, StepOutcome, TurnExecutor, TurnOutcome, TurnResult, TurnSettings, TurnStatus,
    CONNECTION_ERROR_MESSAGE, INTERNAL_ERROR_MESSAGE,
};
pub use error::{ModelError, Result, SessionError};
pub use interrupt::{HumanAssistanceRequest, HumanResponse};
pub use ledger::{ConversationUsage, InMemoryUsageLedger, TurnReport, UsageSink};
pub use llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, ToolDefinition, UsageMetadata};
pub use session::{AgentConfig, ConversationHandle, SessionManager};
pub use tool::{
    ToolError, ToolErrorKind, ToolKind, ToolRegistry, ToolResult, ToolSpec, ToolTransport,
    HUMAN_ASSISTANCE_TOOL,
};

pub use parley_checkpoint::{EngineNode, Message, Role, TokenUsage, ToolCall};
