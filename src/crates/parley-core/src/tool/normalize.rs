//! Tool output normalization.
//!
//! Remote tools return arbitrarily large payloads (a PubMed abstract can run
//! to tens of thousands of characters). Before a result becomes a tool
//! message it is bounded twice:
//!
//! 1. every string field of a JSON payload is cut to `field_chars`;
//! 2. the whole rendered payload is cut to `payload_chars`.
//!
//! A cut keeps the leading characters and appends `"..."`. Budgets count
//! characters, never bytes, so multi-byte text is never split.

use super::{ToolContent, ToolOutput, ToolResult};
use serde_json::Value;
use std::borrow::Cow;

/// Default per-field budget for JSON string values.
pub const FIELD_CHAR_BUDGET: usize = 500;

/// Default budget for a whole tool message.
pub const PAYLOAD_CHAR_BUDGET: usize = 4000;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Size bounds applied to every tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub field_chars: usize,
    pub payload_chars: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            field_chars: FIELD_CHAR_BUDGET,
            payload_chars: PAYLOAD_CHAR_BUDGET,
        }
    }
}

/// Keep the first `budget` characters of `text`, marking any cut with `"..."`.
pub fn truncate_chars(text: &str, budget: usize) -> Cow<'_, str> {
    match text.char_indices().nth(budget) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], ELLIPSIS)),
    }
}

/// Truncate every string inside `value` in place. Returns whether anything
/// was cut.
fn truncate_strings(value: &mut Value, budget: usize) -> bool {
    match value {
        Value::String(s) => match truncate_chars(s, budget) {
            Cow::Borrowed(_) => false,
            Cow::Owned(cut) => {
                *s = cut;
                true
            }
        },
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |cut, item| truncate_strings(item, budget) || cut),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |cut, item| truncate_strings(item, budget) || cut),
        _ => false,
    }
}

fn render_text(text: &str, limits: OutputLimits) -> (String, bool) {
    match serde_json::from_str::<Value>(text) {
        Ok(mut value) if value.is_object() || value.is_array() => {
            let cut = truncate_strings(&mut value, limits.field_chars);
            (value.to_string(), cut)
        }
        _ => (text.to_string(), false),
    }
}

/// Render a remote tool's output as bounded message text.
pub fn normalize(tool: &str, output: &ToolOutput, limits: OutputLimits) -> ToolResult {
    let mut truncated = false;
    let mut parts = Vec::with_capacity(output.content.len());

    if output.content.is_empty() {
        if let Some(structured) = &output.structured_content {
            let mut value = structured.clone();
            truncated |= truncate_strings(&mut value, limits.field_chars);
            parts.push(value.to_string());
        }
    }

    for item in &output.content {
        match item {
            ToolContent::Text { text } => {
                let (rendered, cut) = render_text(text, limits);
                truncated |= cut;
                parts.push(rendered);
            }
            ToolContent::Image { mime_type, .. } => parts.push(format!("[image: {}]", mime_type)),
            ToolContent::Resource { resource } => {
                let mut value = resource.clone();
                truncated |= truncate_strings(&mut value, limits.field_chars);
                parts.push(value.to_string());
            }
        }
    }

    let joined = parts.join("\n");
    let content = match truncate_chars(&joined, limits.payload_chars) {
        Cow::Borrowed(_) => joined,
        Cow::Owned(cut) => {
            truncated = true;
            cut
        }
    };

    ToolResult {
        tool: tool.to_string(),
        content,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_short_text_is_untouched() {
        assert!(matches!(truncate_chars("abc", 3), Cow::Borrowed("abc")));
        assert_eq!(truncate_chars("abcd", 3), "abc...");
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 4), "éééé...");
    }

    #[test]
    fn test_long_abstract_is_cut_to_field_budget() {
        let abstract_text = "a".repeat(10_000);
        let payload = json!({
            "results": [{"title": "Asthma", "abstract": abstract_text, "pmid": "123"}]
        });
        let output = ToolOutput::json(&payload);

        let result = normalize("search_abstracts", &output, OutputLimits::default());
        assert!(result.truncated);

        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        let cut = parsed["results"][0]["abstract"].as_str().unwrap();
        assert_eq!(cut.chars().count(), FIELD_CHAR_BUDGET + ELLIPSIS.len());
        assert!(cut.ends_with(ELLIPSIS));
        assert_eq!(parsed["results"][0]["pmid"], "123");
    }

    #[test]
    fn test_payload_budget_caps_plain_text() {
        let output = ToolOutput::text("x".repeat(PAYLOAD_CHAR_BUDGET * 2));
        let result = normalize("dump", &output, OutputLimits::default());
        assert!(result.truncated);
        assert_eq!(
            result.content.chars().count(),
            PAYLOAD_CHAR_BUDGET + ELLIPSIS.len()
        );
    }

    #[test]
    fn test_structured_content_used_when_no_text() {
        let output = ToolOutput {
            content: vec![],
            structured_content: Some(json!({"count": 2})),
            is_error: false,
        };
        let result = normalize("count", &output, OutputLimits::default());
        assert_eq!(result.content, "{\"count\":2}");
        assert!(!result.truncated);
    }

    proptest! {
        #[test]
        fn prop_truncation_is_bounded_prefix(text in ".{0,300}", budget in 0usize..200) {
            let cut = truncate_chars(&text, budget);
            let kept: String = text.chars().take(budget).collect();

            prop_assert!(cut.chars().count() <= budget + ELLIPSIS.len());
            prop_assert!(cut.starts_with(&kept));
            if text.chars().count() <= budget {
                prop_assert_eq!(&*cut, text.as_str());
            }
        }
    }
}
