//! Groq client.
//!
//! Groq serves Llama models behind an OpenAI-compatible API at
//! `https://api.groq.com/openai/v1`. Tool calling works on the
//! `llama-3.x` instruct models.

use crate::config::{Provider, RemoteLlmConfig};
use crate::error::Result;
use crate::impl_openai_compatible;
use crate::remote::OpenAiClient;

/// Groq API client (OpenAI-compatible).
#[derive(Clone)]
pub struct GroqClient {
    inner: OpenAiClient,
}

impl GroqClient {
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        Ok(Self {
            inner: OpenAiClient::with_provider(config, Provider::Groq.as_str())?,
        })
    }

    /// Default Groq endpoint and model, key from `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(RemoteLlmConfig::for_provider(Provider::Groq)?)
    }
}

impl_openai_compatible!(GroqClient);
