//! Configuration for the parley binary.
//!
//! ```toml
//! [database]
//! path = "parley.db"
//!
//! [llm]
//! provider = "groq"              # openai | groq | deepseek
//! model = "llama-3.1-8b-instant"
//! api_key = "${GROQ_API_KEY}"
//!
//! [engine]
//! model_timeout_secs = 60
//! generate_max_tokens = 512
//! busy_policy = "queue"          # queue | reject
//!
//! [tools]
//! timeout_secs = 30
//!
//! [[tools.servers]]
//! name = "med_tools"
//! url = "http://localhost:8001/mcp"
//!
//! [logging]
//! level = "info"
//!
//! [agent]
//! system_prompt = "You are a medical research assistant."
//! welcome_message = "Hi! What would you like to look up?"
//! creativity = 0.7
//! ```

pub mod env;
mod loader;
mod schema;

pub use loader::{ConfigLoader, DEFAULT_CONFIG_FILE};
pub use schema::{
    AgentSection, DatabaseConfig, EngineSection, LlmConfig, LoggingConfig, ParleyConfig,
    ToolServerConfig, ToolsConfig,
};
