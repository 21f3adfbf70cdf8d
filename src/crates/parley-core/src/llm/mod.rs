//! Model integration seam.
//!
//! The engine never talks to a provider directly. It builds a [`ChatRequest`]
//! (messages, temperature, token cap, bound tools) and hands it to a
//! [`ChatModel`]. Concrete providers live in the `llm` crate; tests use a
//! scripted mock.
//!
//! ```text
//! TurnExecutor ──ChatRequest──▶ dyn ChatModel ──▶ provider HTTP API
//!              ◀─ChatResponse──               ◀──
//! ```

pub mod config;
pub mod response;
pub mod tools;
pub mod traits;

pub use config::{ChatConfig, ChatRequest};
pub use response::{ChatResponse, UsageMetadata};
pub use tools::ToolDefinition;
pub use traits::ChatModel;
