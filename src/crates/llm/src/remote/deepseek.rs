//! DeepSeek client.
//!
//! `deepseek-chat` supports tool calling through the OpenAI-compatible API.
//! `deepseek-reasoner` additionally returns `reasoning_content`, which is
//! kept in the response metadata under `reasoning` and never replayed.

use crate::config::{Provider, RemoteLlmConfig};
use crate::error::Result;
use crate::impl_openai_compatible;
use crate::remote::OpenAiClient;

/// DeepSeek API client (OpenAI-compatible).
#[derive(Clone)]
pub struct DeepseekClient {
    inner: OpenAiClient,
}

impl DeepseekClient {
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        Ok(Self {
            inner: OpenAiClient::with_provider(config, Provider::DeepSeek.as_str())?,
        })
    }

    /// Default DeepSeek endpoint and model, key from `DEEPSEEK_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(RemoteLlmConfig::for_provider(Provider::DeepSeek)?)
    }

    /// Check if this is a thinking model (R1 series).
    pub fn is_reasoner(&self) -> bool {
        let model = &self.inner.config().model;
        model.contains("reasoner") || model.contains("r1")
    }
}

impl_openai_compatible!(DeepseekClient);
