//! The turn state machine.
//!
//! A turn starts from a user message and walks a fixed graph:
//!
//! ```text
//!                 ┌──────── answered ─────────────────────────────┐
//!                 │                                               ▼
//! user ──▶ QueryOrRespond ── tool calls ──▶ ToolDispatch ──▶ Generate ── answered ──▶ Done
//!                                                               │
//!                                              human_assistance │
//!                                                               ▼
//!                                     HumanAssistance ── human input ──▶ Done
//!                                       (suspended)
//! ```
//!
//! Any failed model call ends the turn at `Done` with a fixed user-facing
//! message. [`transition`] is the single source of truth for the edges;
//! [`TurnExecutor`] drives it.

pub mod executor;
pub mod prompt;

pub use executor::{TurnExecutor, TurnOutcome, TurnSettings};

use crate::interrupt::HumanAssistanceRequest;
use chrono::{DateTime, Utc};
use parley_checkpoint::{EngineNode, Message};
use serde::{Deserialize, Serialize};

/// User-facing text for an unavailable model or endpoint.
pub const CONNECTION_ERROR_MESSAGE: &str =
    "❌ Connection issue: the model or endpoint was not found. Please try again later.";

/// User-facing text for every other model failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "⚠️ An unexpected error occurred. Please try again.";

/// What a node produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The model answered in plain text
    Answered,
    /// The model issued remote tool calls
    ToolCallsRequested,
    /// Every tool call of the last assistant message has a result
    ToolsCompleted,
    /// The model asked for an operator
    HumanAssistanceRequested,
    /// An operator answered a suspension
    HumanInputReceived,
    /// A model call failed
    Failed,
}

/// Next node after `node` produced `outcome`, or `None` if that outcome
/// cannot happen there.
pub fn transition(node: EngineNode, outcome: StepOutcome) -> Option<EngineNode> {
    use EngineNode::*;
    use StepOutcome::*;

    match (node, outcome) {
        (Done, _) => None,
        (_, Failed) => Some(Done),
        (QueryOrRespond, ToolCallsRequested) => Some(ToolDispatch),
        (QueryOrRespond, Answered) => Some(Done),
        (ToolDispatch, ToolsCompleted) => Some(Generate),
        (Generate, HumanAssistanceRequested) => Some(HumanAssistance),
        (Generate, Answered) => Some(Done),
        (HumanAssistance, HumanInputReceived) => Some(Done),
        _ => None,
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnStatus {
    Answered,
    AwaitingHuman,
    ConnectionError,
    InternalError,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Answered => "answered",
            TurnStatus::AwaitingHuman => "awaiting-human",
            TurnStatus::ConnectionError => "connection-error",
            TurnStatus::InternalError => "internal-error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TurnStatus::ConnectionError | TurnStatus::InternalError)
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one user turn or resumption, as reported to the caller.
///
/// Token counts are those of the turn's final model call only; failed turns
/// report zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// The assistant message that ended the turn
    pub message: Message,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// When the final model response arrived
    pub timestamp: DateTime<Utc>,
    pub status: TurnStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<HumanAssistanceRequest>,

    /// Underlying failure, for logs only
    #[serde(skip)]
    pub error_detail: Option<String>,
}

impl TurnResult {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EngineNode::*;

    #[test]
    fn test_direct_answer_path() {
        assert_eq!(transition(QueryOrRespond, StepOutcome::Answered), Some(Done));
    }

    #[test]
    fn test_tool_path() {
        let node = transition(QueryOrRespond, StepOutcome::ToolCallsRequested).unwrap();
        assert_eq!(node, ToolDispatch);
        let node = transition(node, StepOutcome::ToolsCompleted).unwrap();
        assert_eq!(node, Generate);
        assert_eq!(transition(node, StepOutcome::Answered), Some(Done));
    }

    #[test]
    fn test_escalation_path() {
        let node = transition(Generate, StepOutcome::HumanAssistanceRequested).unwrap();
        assert_eq!(node, HumanAssistance);
        assert_eq!(transition(node, StepOutcome::HumanInputReceived), Some(Done));
    }

    #[test]
    fn test_failure_always_ends_the_turn() {
        for node in [QueryOrRespond, ToolDispatch, Generate, HumanAssistance] {
            assert_eq!(transition(node, StepOutcome::Failed), Some(Done));
        }
    }

    #[test]
    fn test_impossible_edges() {
        assert_eq!(transition(QueryOrRespond, StepOutcome::HumanAssistanceRequested), None);
        assert_eq!(transition(ToolDispatch, StepOutcome::Answered), None);
        assert_eq!(transition(Generate, StepOutcome::ToolCallsRequested), None);
        assert_eq!(transition(Done, StepOutcome::Answered), None);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(TurnStatus::AwaitingHuman).unwrap(),
            "awaiting-human"
        );
        assert!(TurnStatus::ConnectionError.is_error());
        assert!(!TurnStatus::Answered.is_error());
    }
}
