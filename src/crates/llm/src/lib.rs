//! Chat model providers for parley.
//!
//! This crate implements the `ChatModel` trait from `parley-core` for
//! OpenAI-compatible chat completion endpoints:
//!
//! | Provider   | Default model          | Key variable       |
//! |------------|------------------------|--------------------|
//! | `openai`   | `gpt-4o-mini`          | `OPENAI_API_KEY`   |
//! | `groq`     | `llama-3.1-8b-instant` | `GROQ_API_KEY`     |
//! | `deepseek` | `deepseek-chat`        | `DEEPSEEK_API_KEY` |
//!
//! Every client retries transient failures (connect errors, 429, 5xx) with
//! exponential backoff and maps the final failure into
//! [`parley_core::ModelError`]: a missing model or an unreachable endpoint
//! becomes `Unavailable`, anything else `Failure`. Error bodies are scrubbed
//! of credentials before they are logged or returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm::{build_chat_model, Provider, RemoteLlmConfig};
//! use parley_core::{ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::for_provider(Provider::Groq)?;
//!     let model = build_chat_model(Provider::Groq, config)?;
//!
//!     let request = ChatRequest::new(vec![
//!         Message::system("You are a medical librarian."),
//!         Message::user("What is asthma?"),
//!     ])
//!     .with_temperature(0.7);
//!
//!     let response = model.chat(request).await?;
//!     println!("{}", response.message.content);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod redact;
pub mod retry;

mod provider_macros;

#[cfg(feature = "remote")]
pub mod remote;

pub use config::{Provider, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use redact::redact_secrets;
pub use retry::RetryPolicy;

pub use parley_core::{ChatModel, ChatRequest, ChatResponse, UsageMetadata};

/// Build the client for `provider` behind the engine's model trait.
#[cfg(feature = "remote")]
pub fn build_chat_model(
    provider: Provider,
    config: RemoteLlmConfig,
) -> Result<std::sync::Arc<dyn ChatModel>> {
    use remote::{DeepseekClient, GroqClient, OpenAiClient};
    use std::sync::Arc;

    tracing::info!(provider = %provider, model = %config.model, "building chat model");
    let model: Arc<dyn ChatModel> = match provider {
        Provider::OpenAi => Arc::new(OpenAiClient::new(config)?),
        Provider::Groq => Arc::new(GroqClient::new(config)?),
        Provider::DeepSeek => Arc::new(DeepseekClient::new(config)?),
    };
    Ok(model)
}
