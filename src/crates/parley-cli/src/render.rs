//! Terminal rendering of turns, history and checkpoints.

use parley_checkpoint::CheckpointSummary;
use parley_core::{HumanAssistanceRequest, Message, Role, ToolSpec, TurnResult, TurnStatus};
use std::fmt::Write;

fn speaker(message: &Message) -> &'static str {
    match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

pub fn message_line(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        speaker(message),
        message.content
    )
}

pub fn history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(message_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn interrupt(request: &HumanAssistanceRequest) -> String {
    format!(
        "⏸ Waiting for a human expert (call {}):\n  {}",
        request.tool_call_id, request.query
    )
}

pub fn turn(result: &TurnResult) -> String {
    let mut out = String::new();
    match (&result.status, &result.interrupt) {
        (TurnStatus::AwaitingHuman, Some(request)) => out.push_str(&interrupt(request)),
        _ => out.push_str(&result.message.content),
    }
    let _ = write!(
        out,
        "\n  ({} | {} prompt + {} completion tokens)",
        result.status,
        result.prompt_tokens,
        result.completion_tokens
    );
    out
}

pub fn checkpoints(summaries: &[CheckpointSummary]) -> String {
    let mut out = format!(
        "{:<6} {:<20} {:<18} {:<9} {:<10} {}",
        "STEP", "TIME", "NODE", "MESSAGES", "SOURCE", "STATUS"
    );
    for summary in summaries {
        let source = serde_json::to_value(summary.metadata.source)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let _ = write!(
            out,
            "\n{:<6} {:<20} {:<18} {:<9} {:<10} {}",
            summary.step,
            summary.ts.format("%Y-%m-%d %H:%M:%S"),
            summary.node,
            summary.message_count,
            source,
            summary.metadata.status.as_deref().unwrap_or("-")
        );
    }
    out
}

pub fn tools(specs: &[ToolSpec]) -> String {
    specs
        .iter()
        .map(|spec| match &spec.server {
            Some(server) => format!("{} ({}): {}", spec.name, server, spec.description),
            None => format!("{} (built-in): {}", spec.name, spec.description),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(status: TurnStatus, content: &str) -> TurnResult {
        TurnResult {
            message: Message::assistant(content),
            prompt_tokens: 40,
            completion_tokens: 8,
            timestamp: Utc::now(),
            status,
            interrupt: None,
            error_detail: None,
        }
    }

    #[test]
    fn test_answered_turn_shows_content_and_usage() {
        let out = turn(&result(TurnStatus::Answered, "Asthma is a chronic disease."));
        assert!(out.starts_with("Asthma is a chronic disease."));
        assert!(out.contains("answered | 40 prompt + 8 completion tokens"));
    }

    #[test]
    fn test_suspended_turn_shows_query() {
        let mut suspended = result(TurnStatus::AwaitingHuman, "");
        suspended.interrupt = Some(HumanAssistanceRequest {
            tool_call_id: "call_9".to_string(),
            query: "Is 20mg safe for a child?".to_string(),
            raised_at: Utc::now(),
        });
        let out = turn(&suspended);
        assert!(out.contains("call_9"));
        assert!(out.contains("Is 20mg safe for a child?"));
        assert!(out.contains("awaiting-human"));
    }

    #[test]
    fn test_history_labels_speakers() {
        let out = history(&[Message::user("hi"), Message::assistant("hello")]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("you: hi"));
        assert!(lines[1].ends_with("assistant: hello"));
    }
}
