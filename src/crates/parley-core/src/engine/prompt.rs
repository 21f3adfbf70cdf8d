//! Prompt assembly for the `generate` node.
//!
//! The generation prompt is rebuilt from scratch on every call:
//!
//! ```text
//! [system: GENERATE_PREAMBLE + contents of the trailing tool messages]
//! + every system and user message
//! + every assistant message that carries no tool calls
//! ```
//!
//! Tool messages and tool-calling assistant messages from earlier turns are
//! left out, so old retrieval results never leak into a new answer.

use parley_checkpoint::{Message, Role};

/// Instruction prepended to the retrieved context.
pub const GENERATE_PREAMBLE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\n";

/// The maximal run of tool messages at the end of `messages`.
pub fn trailing_tool_run(messages: &[Message]) -> &[Message] {
    let start = messages
        .iter()
        .rposition(|m| m.role != Role::Tool)
        .map(|i| i + 1)
        .unwrap_or(0);
    &messages[start..]
}

/// Messages of `messages` that belong to the visible conversation.
pub fn conversational(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| match m.role {
            Role::System | Role::User => true,
            Role::Assistant => !m.has_tool_calls(),
            Role::Tool => false,
        })
        .cloned()
        .collect()
}

/// Tool results produced since the latest user message, in order.
pub fn turn_tool_results(messages: &[Message]) -> Vec<&Message> {
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .map(|i| i + 1)
        .unwrap_or(0);
    messages[start..].iter().filter(|m| m.role == Role::Tool).collect()
}

fn instruction<'a>(docs: impl IntoIterator<Item = &'a Message>) -> String {
    let docs: Vec<&str> = docs.into_iter().map(|m| m.content.as_str()).collect();
    format!("{}{}", GENERATE_PREAMBLE, docs.join("\n\n"))
}

/// System instruction carrying the trailing tool results as context.
pub fn context_instruction(messages: &[Message]) -> String {
    instruction(trailing_tool_run(messages))
}

/// Full prompt for a `generate` model call.
pub fn generate_prompt(messages: &[Message]) -> Vec<Message> {
    let mut prompt = Vec::with_capacity(messages.len() + 1);
    prompt.push(Message::system(context_instruction(messages)));
    prompt.extend(conversational(messages));
    prompt
}

/// Prompt for the closing answer after a human reply.
///
/// The context is every tool result of the suspended turn, so the search
/// results fetched before the escalation sit next to the operator's answer,
/// which comes last.
pub fn resume_prompt(messages: &[Message]) -> Vec<Message> {
    let mut prompt = Vec::with_capacity(messages.len() + 1);
    prompt.push(Message::system(instruction(turn_tool_results(messages))));
    prompt.extend(conversational(messages));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_checkpoint::ToolCall;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "search_abstracts", json!({"term": "asthma"}))
    }

    fn history() -> Vec<Message> {
        vec![
            Message::system("You are a medical librarian."),
            Message::user("first question"),
            Message::assistant("").with_tool_calls(vec![call("old")]),
            Message::tool("OLD-RESULT", "old", "search_abstracts"),
            Message::assistant("first answer"),
            Message::user("second question"),
            Message::assistant("").with_tool_calls(vec![call("a"), call("b")]),
            Message::tool("NEW-A", "a", "search_abstracts"),
            Message::tool("NEW-B", "b", "search_abstracts"),
        ]
    }

    #[test]
    fn test_trailing_run_is_only_the_latest_batch() {
        let messages = history();
        let run = trailing_tool_run(&messages);
        let contents: Vec<_> = run.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["NEW-A", "NEW-B"]);
    }

    #[test]
    fn test_no_trailing_run() {
        let messages = vec![Message::user("hi")];
        assert!(trailing_tool_run(&messages).is_empty());
        assert!(trailing_tool_run(&[]).is_empty());
    }

    #[test]
    fn test_generate_prompt_shape() {
        let prompt = generate_prompt(&history());

        assert_eq!(prompt[0].role, Role::System);
        assert_eq!(prompt[0].content, format!("{}NEW-A\n\nNEW-B", GENERATE_PREAMBLE));
        assert!(!prompt[0].content.contains("OLD-RESULT"));

        let rest: Vec<_> = prompt[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            rest,
            vec![
                "You are a medical librarian.",
                "first question",
                "first answer",
                "second question"
            ]
        );
        assert!(prompt.iter().all(|m| m.role != Role::Tool && !m.has_tool_calls()));
    }

    #[test]
    fn test_resume_prompt_keeps_earlier_results_of_the_turn() {
        let mut messages = history();
        messages.push(Message::assistant("").with_tool_calls(vec![ToolCall::new(
            "h1",
            "human_assistance",
            json!({"query": "confirm?"}),
        )]));
        messages.push(Message::tool("EXPERT", "h1", "human_assistance"));

        let prompt = resume_prompt(&messages);
        assert_eq!(
            prompt[0].content,
            format!("{}NEW-A\n\nNEW-B\n\nEXPERT", GENERATE_PREAMBLE)
        );
        assert!(!prompt[0].content.contains("OLD-RESULT"));
        assert_eq!(prompt.last().unwrap().content, "second question");

        // Plain generation only sees the reply itself.
        assert_eq!(context_instruction(&messages), format!("{}EXPERT", GENERATE_PREAMBLE));
    }
}
