//! End-to-end wiring: config file, SQLite store and a scripted model.

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_cli::config::ToolServerConfig;
use parley_cli::{AppContext, ConfigLoader, ParleyConfig};
use parley_core::{
    ChatModel, ChatRequest, ChatResponse, Message, ModelError, Role, TurnStatus, UsageMetadata,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;

struct CannedModel {
    answers: Mutex<VecDeque<String>>,
}

impl CannedModel {
    fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ChatModel for CannedModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let answer = self
            .answers
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::failure("script exhausted"))?;
        Ok(ChatResponse::new(Message::assistant(answer)).with_usage(UsageMetadata::new(20, 5)))
    }
}

fn config_in(dir: &TempDir) -> ParleyConfig {
    let mut config = ParleyConfig::default();
    config.database.path = dir.path().join("parley.db");
    config.agent.system_prompt = "You are a medical librarian.".to_string();
    config.agent.welcome_message = Some("Hello! Ask me anything.".to_string());
    config
}

#[tokio::test]
async fn test_turns_persist_across_contexts() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let app = AppContext::with_model(&config, CannedModel::new(&["Asthma narrows the airways."]))
        .await
        .unwrap();
    let handle = app.sessions.start_conversation(&app.agent).await.unwrap();
    assert_eq!(handle.welcome.as_ref().unwrap().content, "Hello! Ask me anything.");

    let result = app
        .sessions
        .send_turn(&handle.conversation_id, "What is asthma?")
        .await
        .unwrap();
    assert_eq!(result.status, TurnStatus::Answered);
    assert_eq!(result.total_tokens(), 25);
    assert_eq!(app.ledger.total_tokens(&handle.conversation_id), 25);
    app.shutdown().await;

    let reopened = AppContext::offline(&config).await.unwrap();
    let history = reopened
        .sessions
        .get_history(&handle.conversation_id)
        .await
        .unwrap();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(history[2].content, "Asthma narrows the airways.");

    let checkpoints = reopened
        .sessions
        .checkpoints(&handle.conversation_id, None)
        .await
        .unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].step, 1);
    reopened.shutdown().await;
}

#[tokio::test]
async fn test_offline_context_reports_connection_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let app = AppContext::offline(&config).await.unwrap();
    let handle = app.sessions.start_conversation(&app.agent).await.unwrap();
    let result = app
        .sessions
        .send_turn(&handle.conversation_id, "hello?")
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::ConnectionError);
    assert_eq!(result.message.content, parley_core::CONNECTION_ERROR_MESSAGE);
    app.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_tool_server_does_not_block_startup() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/mcp", listener.local_addr().unwrap());
    drop(listener);
    config.tools.servers = vec![ToolServerConfig {
        name: "med_tools".to_string(),
        url,
    }];

    let app = AppContext::with_model(&config, CannedModel::new(&["ok"]))
        .await
        .unwrap();
    assert_eq!(app.tools.remote_count(), 0);
    assert!(app.tools.resolve("human_assistance").is_ok());
    app.shutdown().await;
}

#[tokio::test]
async fn test_loader_reads_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("parley.toml");
    tokio::fs::write(
        &path,
        r#"
        [llm]
        provider = "groq"

        [agent]
        system_prompt = "You are terse."
        creativity = 0.1
        "#,
    )
    .await
    .unwrap();

    let config = ConfigLoader::with_path(&path).load().await.unwrap();
    assert_eq!(config.agent.system_prompt, "You are terse.");
    assert!((config.agent.creativity - 0.1).abs() < f32::EPSILON);

    let missing = ConfigLoader::with_path(dir.path().join("nope.toml")).load().await;
    assert!(missing.is_err());
}
