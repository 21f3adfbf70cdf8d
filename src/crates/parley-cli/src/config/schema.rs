//! Configuration schema for `parley.toml`

use crate::config::env::{
    expand_env_var, get_env, get_env_parse, ENV_DATABASE, ENV_LLM_MODEL, ENV_LLM_PROVIDER,
    ENV_MCP_URL,
};
use crate::error::{CliError, Result};
use llm::{Provider, RemoteLlmConfig};
use parley_core::tool::OutputLimits;
use parley_core::{AgentConfig, BusyPolicy, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main parley configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub agent: AgentSection,
}

/// Checkpoint store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; created on first use
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("parley.db"),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Defaults to the provider's default model
    #[serde(default)]
    pub model: Option<String>,

    /// Literal key or `${VAR}` reference; defaults to the provider's key variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Defaults to the provider's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Resolve the API key and endpoint into a client configuration.
    pub fn remote_config(&self) -> Result<RemoteLlmConfig> {
        let api_key = match &self.api_key {
            Some(key) => Some(expand_env_var(key)).filter(|k| !k.starts_with("${")),
            None => get_env(self.provider.api_key_env())?,
        };
        let api_key = api_key.ok_or_else(|| {
            CliError::config(format!(
                "no API key for provider '{}': set {} or llm.api_key",
                self.provider,
                self.provider.api_key_env()
            ))
        })?;

        let base_url = self
            .base_url
            .as_deref()
            .map(expand_env_var)
            .unwrap_or_else(|| self.provider.default_base_url().to_string());

        Ok(RemoteLlmConfig::new(api_key, base_url, self.model_name())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_retries(self.max_retries))
    }
}

/// Turn executor tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    /// Completion cap for the final answer; `0` disables it
    #[serde(default = "default_generate_max_tokens")]
    pub generate_max_tokens: usize,

    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

fn default_model_timeout() -> u64 {
    parley_core::config::DEFAULT_MODEL_TIMEOUT.as_secs()
}

fn default_generate_max_tokens() -> usize {
    parley_core::config::DEFAULT_GENERATE_MAX_TOKENS
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            model_timeout_secs: default_model_timeout(),
            generate_max_tokens: default_generate_max_tokens(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

impl EngineSection {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_model_timeout(Duration::from_secs(self.model_timeout_secs))
            .with_generate_max_tokens(Some(self.generate_max_tokens).filter(|n| *n > 0))
            .with_busy_policy(self.busy_policy)
    }
}

/// Tool servers and result bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call deadline
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_field_chars")]
    pub field_chars: usize,

    #[serde(default = "default_payload_chars")]
    pub payload_chars: usize,

    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_field_chars() -> usize {
    parley_core::tool::normalize::FIELD_CHAR_BUDGET
}

fn default_payload_chars() -> usize {
    parley_core::tool::normalize::PAYLOAD_CHAR_BUDGET
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            field_chars: default_field_chars(),
            payload_chars: default_payload_chars(),
            servers: Vec::new(),
        }
    }
}

impl ToolsConfig {
    pub fn limits(&self) -> OutputLimits {
        OutputLimits {
            field_chars: self.field_chars,
            payload_chars: self.payload_chars,
        }
    }
}

/// One MCP server reachable over streamable HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub name: String,
    pub url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `parley_core=debug,info`
    pub level: String,

    /// `compact` or `pretty`
    pub format: String,

    pub colored: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            colored: true,
        }
    }
}

/// Agent new conversations are started from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default)]
    pub welcome_message: Option<String>,

    #[serde(default = "default_creativity")]
    pub creativity: f32,
}

fn default_system_prompt() -> String {
    "You are a medical research assistant. Use the available tools to search the \
     literature before answering, and ask a human expert when you are unsure."
        .to_string()
}

fn default_creativity() -> f32 {
    0.7
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            agent_id: None,
            system_prompt: default_system_prompt(),
            welcome_message: None,
            creativity: default_creativity(),
        }
    }
}

impl AgentSection {
    pub fn agent_config(&self) -> AgentConfig {
        let mut agent = AgentConfig::new(&self.system_prompt).with_creativity(self.creativity);
        if let Some(id) = &self.agent_id {
            agent = agent.with_agent_id(id);
        }
        if let Some(welcome) = &self.welcome_message {
            agent = agent.with_welcome(welcome);
        }
        agent
    }
}

impl ParleyConfig {
    /// Parse a TOML document; missing sections take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PARLEY_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(path) = get_env(ENV_DATABASE)? {
            self.database.path = PathBuf::from(path);
        }
        if let Some(provider) = get_env_parse::<Provider>(ENV_LLM_PROVIDER)? {
            if provider != self.llm.provider {
                // Model and endpoint configured for another provider do not carry over
                self.llm.model = None;
                self.llm.base_url = None;
                self.llm.api_key = None;
            }
            self.llm.provider = provider;
        }
        if let Some(model) = get_env(ENV_LLM_MODEL)? {
            self.llm.model = Some(model);
        }
        if let Some(url) = get_env(ENV_MCP_URL)? {
            self.tools.servers = vec![ToolServerConfig {
                name: "med_tools".to_string(),
                url,
            }];
        }
        Ok(())
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.agent.system_prompt.trim().is_empty() {
            return Err(CliError::config("agent.system_prompt is empty"));
        }
        if self.engine.model_timeout_secs == 0 {
            return Err(CliError::config("engine.model_timeout_secs must be positive"));
        }
        if self.tools.timeout_secs == 0 {
            return Err(CliError::config("tools.timeout_secs must be positive"));
        }
        if self.tools.field_chars == 0 || self.tools.payload_chars == 0 {
            return Err(CliError::config("tools budgets must be positive"));
        }
        let mut names: Vec<&str> = self.tools.servers.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(CliError::config(format!("duplicate tool server '{}'", pair[0])));
        }
        Ok(())
    }
}
