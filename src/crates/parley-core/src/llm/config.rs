//! Request configuration for model calls.

use crate::llm::tools::ToolDefinition;
use parley_checkpoint::Message;

/// A request to a chat model: the prompt plus generation settings.
///
/// ```rust
/// use parley_core::llm::{ChatRequest, ToolDefinition};
/// use parley_core::Message;
///
/// let request = ChatRequest::new(vec![
///     Message::system("You are a medical research assistant."),
///     Message::user("Any recent work on asthma biologics?"),
/// ])
/// .with_temperature(0.7)
/// .with_max_tokens(512)
/// .with_tools(vec![ToolDefinition::new("search_abstracts", "Search PubMed")]);
///
/// assert_eq!(request.config.max_tokens, Some(512));
/// assert!(request.has_tools());
/// ```
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    /// Sampling temperature. Providers accept 0.0 to 2.0.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    /// Bind tools the model may call. An empty list binds nothing.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.config.tools.is_empty()
    }
}

/// Generation parameters. Unset fields use the provider default.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Vec<ToolDefinition>,
}
