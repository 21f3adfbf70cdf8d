//! Remote LLM provider implementations.
//!
//! All three providers speak the OpenAI chat completions format:
//!
//! - **OpenAI** - `gpt-4o`, `gpt-4o-mini`
//! - **Groq** - hosted Llama models
//! - **DeepSeek** - `deepseek-chat`, `deepseek-reasoner`

pub mod deepseek;
pub mod groq;
pub mod openai;

pub use deepseek::DeepseekClient;
pub use groq::GroqClient;
pub use openai::OpenAiClient;
