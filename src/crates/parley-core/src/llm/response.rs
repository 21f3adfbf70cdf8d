//! Model responses and token accounting.

use parley_checkpoint::{Message, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Result of one [`ChatModel::chat`](crate::llm::ChatModel::chat) call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant message, possibly carrying tool calls
    pub message: Message,

    /// Provider-reported token counts, when available
    pub usage: Option<UsageMetadata>,

    /// Provider-specific extras (finish reason, system fingerprint, ...)
    pub metadata: HashMap<String, Value>,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Token usage of a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageMetadata {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl From<UsageMetadata> for TokenUsage {
    fn from(usage: UsageMetadata) -> Self {
        TokenUsage::new(usage.input_tokens, usage.output_tokens)
    }
}
