//! Wiring of store, tools and model into a session manager.

use crate::config::{ParleyConfig, ToolsConfig};
use crate::error::Result;
use async_trait::async_trait;
use parley_checkpoint::{CheckpointSaver, SqliteCheckpointSaver};
use parley_core::tool::McpHttpTransport;
use parley_core::{
    AgentConfig, ChatModel, ChatRequest, ChatResponse, InMemoryUsageLedger, ModelError,
    SessionManager, ToolRegistry, TurnExecutor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Connect timeout for MCP servers; the per-call deadline still applies on top.
const MCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a command needs to operate on conversations.
pub struct AppContext {
    pub sessions: SessionManager,
    pub tools: Arc<ToolRegistry>,
    pub ledger: Arc<InMemoryUsageLedger>,
    pub agent: AgentConfig,
    saver: Arc<SqliteCheckpointSaver>,
}

impl AppContext {
    /// Build from configuration, constructing the configured provider client.
    pub async fn from_config(config: &ParleyConfig) -> Result<Self> {
        let model = llm::build_chat_model(config.llm.provider, config.llm.remote_config()?)?;
        Self::with_model(config, model).await
    }

    /// Build from configuration around an already constructed model.
    pub async fn with_model(config: &ParleyConfig, model: Arc<dyn ChatModel>) -> Result<Self> {
        let tools = discover_tools(&config.tools).await?;
        Self::assemble(config, model, tools).await
    }

    /// Store access only: no provider key needed and no tool discovery.
    /// Turns run against this context fail with a connection error.
    pub async fn offline(config: &ParleyConfig) -> Result<Self> {
        Self::assemble(config, Arc::new(NoModel), ToolRegistry::empty()).await
    }

    async fn assemble(
        config: &ParleyConfig,
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
    ) -> Result<Self> {
        let saver = Arc::new(SqliteCheckpointSaver::connect(&config.database.path).await?);
        let tools = Arc::new(tools);

        let executor = Arc::new(TurnExecutor::new(
            model,
            Arc::clone(&tools),
            config.engine.engine_config(),
        ));
        let ledger = Arc::new(InMemoryUsageLedger::new());
        let sessions = SessionManager::new(saver.clone() as Arc<dyn CheckpointSaver>, executor)
            .with_usage_sink(ledger.clone());

        Ok(Self {
            sessions,
            tools,
            ledger,
            agent: config.agent.agent_config(),
            saver,
        })
    }

    /// Flush and close the store.
    pub async fn shutdown(&self) {
        self.saver.close().await;
    }
}

struct NoModel;

#[async_trait]
impl ChatModel for NoModel {
    async fn chat(&self, _request: ChatRequest) -> std::result::Result<ChatResponse, ModelError> {
        Err(ModelError::unavailable("no model configured for this command"))
    }
}

/// List every configured server. Unreachable servers contribute no tools.
pub async fn discover_tools(config: &ToolsConfig) -> Result<ToolRegistry> {
    let client = reqwest::Client::builder()
        .connect_timeout(MCP_CONNECT_TIMEOUT)
        .build()
        .map_err(llm::LlmError::from)?;

    let started = Instant::now();
    let mut builder = ToolRegistry::builder()
        .with_limits(config.limits())
        .with_default_timeout(Duration::from_secs(config.timeout_secs));
    for server in &config.servers {
        let transport = McpHttpTransport::with_client(&server.name, &server.url, client.clone());
        builder = builder.discover(Arc::new(transport)).await;
    }
    let registry = builder.build();

    info!(
        servers = config.servers.len(),
        tools = registry.remote_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool discovery finished"
    );
    Ok(registry)
}
