//! Shared fixtures: a scripted model, a fake tool server and engine wiring.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver, Message, ToolCall};
use parley_core::tool::{RemoteTool, ToolOutput};
use parley_core::{
    ChatModel, ChatRequest, ChatResponse, EngineConfig, InMemoryUsageLedger, ModelError,
    SessionManager, ToolError, ToolRegistry, ToolTransport, TurnExecutor, UsageMetadata,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SYSTEM_PROMPT: &str = "You are a medical research assistant.";
pub const WELCOME: &str = "Hello! Ask me about the medical literature.";

pub type Scripted = Result<ChatResponse, ModelError>;

/// Plain-text answer with the given usage.
pub fn answer(text: &str, prompt_tokens: u64, completion_tokens: u64) -> Scripted {
    Ok(ChatResponse::new(Message::assistant(text))
        .with_usage(UsageMetadata::new(prompt_tokens, completion_tokens)))
}

/// Assistant message requesting the given tool calls.
pub fn calls(tool_calls: Vec<ToolCall>, prompt_tokens: u64, completion_tokens: u64) -> Scripted {
    Ok(ChatResponse::new(Message::assistant("").with_tool_calls(tool_calls))
        .with_usage(UsageMetadata::new(prompt_tokens, completion_tokens)))
}

pub fn search(id: &str, term: &str) -> ToolCall {
    ToolCall::new(id, "search_abstracts", json!({ "term": term }))
}

pub fn escalate(id: &str, query: &str) -> Scripted {
    calls(
        vec![ToolCall::new(id, "human_assistance", json!({ "query": query }))],
        40,
        8,
    )
}

/// Model that replays a fixed script and records every request.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Duration,
}

impl ScriptedModel {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().push_back(step);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests
            .lock()
            .last()
            .cloned()
            .expect("model was never called")
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        next.unwrap_or_else(|| Err(ModelError::failure("script exhausted")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-process stand-in for an MCP server.
pub struct FakeToolServer {
    name: String,
    tools: Vec<RemoteTool>,
    responses: Mutex<HashMap<String, Result<ToolOutput, ToolError>>>,
    delay: Duration,
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeToolServer {
    pub fn med_tools() -> Self {
        Self {
            name: "med_tools".to_string(),
            tools: vec![RemoteTool {
                name: "search_abstracts".to_string(),
                description: Some("Search PubMed abstracts".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "term": {"type": "string"},
                        "retmax": {"type": "integer"}
                    },
                    "required": ["term"]
                }),
            }],
            responses: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fix the response for calls whose `term` argument equals `term`.
    pub fn respond(self, term: &str, response: Result<ToolOutput, ToolError>) -> Self {
        self.responses.lock().insert(term.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTransport for FakeToolServer {
    fn server(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ToolError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        self.calls.lock().push((name.to_string(), arguments.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let term = arguments
            .get("term")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let fixed = self.responses.lock().get(&term).cloned();
        fixed.unwrap_or_else(|| {
            Ok(ToolOutput::json(&json!({
                "results": [{
                    "title": format!("Findings on {}", term),
                    "abstract": format!("Abstract about {}.", term),
                    "pmid": "100"
                }]
            })))
        })
    }
}

/// A wired-up engine and its observable parts.
pub struct Harness {
    pub sessions: SessionManager,
    pub model: Arc<ScriptedModel>,
    pub server: Arc<FakeToolServer>,
    pub ledger: Arc<InMemoryUsageLedger>,
}

pub async fn harness(model: ScriptedModel) -> Harness {
    harness_with(
        model,
        FakeToolServer::med_tools(),
        Arc::new(InMemoryCheckpointSaver::new()),
        EngineConfig::default(),
    )
    .await
}

pub async fn harness_with(
    model: ScriptedModel,
    server: FakeToolServer,
    saver: Arc<dyn CheckpointSaver>,
    config: EngineConfig,
) -> Harness {
    let model = Arc::new(model);
    let server = Arc::new(server);
    let ledger = Arc::new(InMemoryUsageLedger::new());

    let registry = ToolRegistry::builder()
        .discover(server.clone())
        .await
        .build();
    let executor = TurnExecutor::new(model.clone(), Arc::new(registry), config);
    let sessions = SessionManager::new(saver, Arc::new(executor)).with_usage_sink(ledger.clone());

    Harness {
        sessions,
        model,
        server,
        ledger,
    }
}
