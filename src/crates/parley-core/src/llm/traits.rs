//! The [`ChatModel`] trait.

use crate::error::ModelError;
use crate::llm::config::ChatRequest;
use crate::llm::response::ChatResponse;
use async_trait::async_trait;

/// Provider-agnostic chat completion.
///
/// Implementations convert [`ChatRequest::messages`] to their wire format,
/// advertise [`ChatConfig::tools`](crate::llm::ChatConfig::tools) when
/// non-empty, and return the assistant message with any tool calls the
/// model issued.
///
/// Errors must be classified: a missing model or unreachable endpoint is
/// [`ModelError::Unavailable`]; everything else is
/// [`ModelError::Failure`]. The caller enforces its own timeout.
///
/// Implementations must be `Send + Sync`; the engine shares them as
/// `Arc<dyn ChatModel>` across concurrent conversations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate one assistant message.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}
