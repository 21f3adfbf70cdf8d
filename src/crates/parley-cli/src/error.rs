//! Error types for the parley CLI

use thiserror::Error;

/// Result type for CLI setup
pub type Result<T> = std::result::Result<T, CliError>;

/// Failures while loading configuration or wiring the engine.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {key}: {message}")]
    Env { key: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    #[error(transparent)]
    Checkpoint(#[from] parley_checkpoint::CheckpointError),
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
