//! Token accounting per conversation.
//!
//! The engine reports every committed turn to a [`UsageSink`]. The bundled
//! [`InMemoryUsageLedger`] keeps running totals; hosts that persist
//! conversation records elsewhere implement the trait against their store.

use crate::engine::{TurnResult, TurnStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a committed turn reports to the conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub conversation_id: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Final assistant text
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: TurnStatus,
}

impl TurnReport {
    pub fn new(conversation_id: impl Into<String>, result: &TurnResult) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            prompt_tokens: result.prompt_tokens,
            completion_tokens: result.completion_tokens,
            text: result.message.content.clone(),
            timestamp: result.timestamp,
            status: result.status,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Receiver of per-turn usage reports.
///
/// Called after the turn is committed. Implementations must not fail the
/// turn; log and swallow storage errors instead.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// A conversation was created.
    async fn record_start(&self, _conversation_id: &str, _agent_id: Option<&str>) {}

    async fn record_turn(&self, report: &TurnReport);
}

/// Running totals of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationUsage {
    pub conversation_id: String,
    pub agent_id: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub turns: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Process-local [`UsageSink`].
#[derive(Debug, Default)]
pub struct InMemoryUsageLedger {
    entries: RwLock<HashMap<String, ConversationUsage>>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self, conversation_id: &str) -> Option<ConversationUsage> {
        self.entries.read().get(conversation_id).cloned()
    }

    pub fn total_tokens(&self, conversation_id: &str) -> u64 {
        self.usage(conversation_id)
            .map(|u| u.total_tokens)
            .unwrap_or(0)
    }

    pub fn conversations(&self) -> Vec<ConversationUsage> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        all
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageLedger {
    async fn record_start(&self, conversation_id: &str, agent_id: Option<&str>) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationUsage {
                conversation_id: conversation_id.to_string(),
                ..Default::default()
            });
        entry.agent_id = agent_id.map(str::to_string);
        entry.created_at.get_or_insert_with(Utc::now);
    }

    async fn record_turn(&self, report: &TurnReport) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(report.conversation_id.clone())
            .or_insert_with(|| ConversationUsage {
                conversation_id: report.conversation_id.clone(),
                ..Default::default()
            });
        entry.prompt_tokens += report.prompt_tokens;
        entry.completion_tokens += report.completion_tokens;
        entry.total_tokens += report.total_tokens();
        entry.turns += 1;
        entry.last_activity = Some(report.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_checkpoint::Message;

    fn report(conversation_id: &str, prompt: u64, completion: u64) -> TurnReport {
        let result = TurnResult {
            message: Message::assistant("ok"),
            prompt_tokens: prompt,
            completion_tokens: completion,
            timestamp: Utc::now(),
            status: TurnStatus::Answered,
            interrupt: None,
            error_detail: None,
        };
        TurnReport::new(conversation_id, &result)
    }

    #[tokio::test]
    async fn test_totals_accumulate_per_conversation() {
        let ledger = InMemoryUsageLedger::new();
        ledger.record_start("c1", Some("librarian")).await;
        ledger.record_turn(&report("c1", 100, 20)).await;
        ledger.record_turn(&report("c1", 150, 30)).await;
        ledger.record_turn(&report("c2", 10, 1)).await;

        let usage = ledger.usage("c1").unwrap();
        assert_eq!(usage.total_tokens, 300);
        assert_eq!(usage.turns, 2);
        assert_eq!(usage.agent_id.as_deref(), Some("librarian"));
        assert!(usage.created_at.is_some());

        assert_eq!(ledger.total_tokens("c2"), 11);
        assert_eq!(ledger.total_tokens("missing"), 0);
        assert_eq!(ledger.conversations().len(), 2);
    }

    #[test]
    fn test_report_carries_final_text_and_status() {
        let report = report("c1", 40, 8);
        assert_eq!(report.text, "ok");
        assert_eq!(report.status, TurnStatus::Answered);
        assert_eq!(report.total_tokens(), 48);
    }
}
