//! Conversation lifecycle on top of a checkpoint store.
//!
//! The [`SessionManager`] is the only writer of conversation streams. For
//! every operation it:
//!
//! 1. takes the conversation's turn lock (queue or reject, see
//!    [`BusyPolicy`]);
//! 2. loads the latest checkpoint;
//! 3. lets the [`TurnExecutor`] compute the turn in memory;
//! 4. commits everything the turn produced in one conditional append.
//!
//! The lock serializes turns inside one process. The conditional append
//! (`parent` = the checkpoint loaded in step 2) catches writers in other
//! processes; on conflict the turn is recomputed once on the fresh state
//! before the conflict is surfaced.
//!
//! Dropping a turn future before step 4 completes leaves the stream exactly
//! as it was.

use crate::config::BusyPolicy;
use crate::engine::executor::visible_history;
use crate::engine::{TurnExecutor, TurnOutcome, TurnResult, TurnSettings};
use crate::error::{Result, SessionError};
use crate::interrupt::{HumanAssistanceRequest, HumanResponse};
use crate::ledger::{TurnReport, UsageSink};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parley_checkpoint::{
    AppendRequest, Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointSummary, Message, SeedRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound accepted for agent creativity.
pub const MAX_CREATIVITY: f32 = 2.0;

/// Agent definition a conversation is started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub welcome_message: Option<String>,
    /// Sampling temperature, clamped to `0.0..=2.0`
    #[serde(default = "default_creativity")]
    pub creativity: f32,
}

fn default_creativity() -> f32 {
    0.7
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            system_prompt: system_prompt.into(),
            welcome_message: None,
            creativity: default_creativity(),
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_welcome(mut self, welcome: impl Into<String>) -> Self {
        self.welcome_message = Some(welcome.into());
        self
    }

    pub fn with_creativity(mut self, creativity: f32) -> Self {
        self.creativity = creativity;
        self
    }

    pub fn temperature(&self) -> f32 {
        if self.creativity.is_nan() {
            return default_creativity();
        }
        self.creativity.clamp(0.0, MAX_CREATIVITY)
    }
}

/// Settings persisted with the stream at seed time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ConversationSettings {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

impl ConversationSettings {
    fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        serde_json::from_value(checkpoint.settings.clone()).unwrap_or_else(|e| {
            warn!(conversation_id = %checkpoint.thread_id, error = %e, "unreadable conversation settings, using defaults");
            Self::default()
        })
    }

    fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            temperature: self.temperature,
        }
    }
}

/// A freshly started conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHandle {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    /// Display-only greeting; never sent to the model
    pub welcome: Option<Message>,
}

type LockTable = Arc<parking_lot::Mutex<HashMap<String, Arc<TurnLock<()>>>>>;

/// Exclusive right to run a turn on one conversation.
struct TurnPermit {
    table: LockTable,
    conversation_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        // Held only by the table and this permit: nobody is queued.
        let idle = table
            .get(&self.conversation_id)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false);
        if idle {
            table.remove(&self.conversation_id);
        }
    }
}

/// Entry point for starting, advancing and inspecting conversations.
///
/// # Example
///
/// ```rust,no_run
/// use parley_checkpoint::InMemoryCheckpointSaver;
/// use parley_core::{AgentConfig, EngineConfig, SessionManager, ToolRegistry, TurnExecutor};
/// use std::sync::Arc;
///
/// # async fn run(model: Arc<dyn parley_core::ChatModel>) -> parley_core::Result<()> {
/// let executor = TurnExecutor::new(model, Arc::new(ToolRegistry::empty()), EngineConfig::default());
/// let sessions = SessionManager::new(Arc::new(InMemoryCheckpointSaver::new()), Arc::new(executor));
///
/// let handle = sessions
///     .start_conversation(&AgentConfig::new("You are a medical librarian.").with_welcome("Hi!"))
///     .await?;
/// let result = sessions.send_turn(&handle.conversation_id, "What is asthma?").await?;
/// println!("{}", result.message.content);
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    saver: Arc<dyn CheckpointSaver>,
    executor: Arc<TurnExecutor>,
    locks: LockTable,
    policy: BusyPolicy,
    usage: Option<Arc<dyn UsageSink>>,
}

impl SessionManager {
    pub fn new(saver: Arc<dyn CheckpointSaver>, executor: Arc<TurnExecutor>) -> Self {
        let policy = executor.config().busy_policy;
        Self {
            saver,
            executor,
            locks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            policy,
            usage: None,
        }
    }

    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = Some(sink);
        self
    }

    pub fn executor(&self) -> &Arc<TurnExecutor> {
        &self.executor
    }

    /// Start a conversation under a fresh id.
    pub async fn start_conversation(&self, agent: &AgentConfig) -> Result<ConversationHandle> {
        self.start_conversation_with_id(&Uuid::new_v4().to_string(), agent)
            .await
    }

    /// Start a conversation under an id chosen by the caller.
    ///
    /// Seeds the stream with the agent's system prompt. The welcome message
    /// is stored beside the history, not in it.
    pub async fn start_conversation_with_id(
        &self,
        conversation_id: &str,
        agent: &AgentConfig,
    ) -> Result<ConversationHandle> {
        if conversation_id.trim().is_empty() {
            return Err(SessionError::InvalidInput("conversation id is empty".to_string()));
        }

        let settings = ConversationSettings {
            agent_id: agent.agent_id.clone(),
            temperature: Some(agent.temperature()),
        };
        let mut seed = SeedRequest::new(Message::system(&agent.system_prompt))
            .with_settings(serde_json::to_value(&settings)?);
        if let Some(welcome) = &agent.welcome_message {
            seed = seed.with_welcome(Message::assistant(welcome).with_metadata("welcome", true));
        }

        let checkpoint = self.saver.seed(conversation_id, seed).await?;
        info!(conversation_id, agent_id = ?agent.agent_id, "conversation started");

        if let Some(sink) = &self.usage {
            sink.record_start(conversation_id, agent.agent_id.as_deref())
                .await;
        }

        Ok(ConversationHandle {
            conversation_id: conversation_id.to_string(),
            created_at: checkpoint.ts,
            welcome: checkpoint.welcome,
        })
    }

    /// Run one user turn and commit it.
    pub async fn send_turn(&self, conversation_id: &str, text: &str) -> Result<TurnResult> {
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput("message text is empty".to_string()));
        }

        let executor = self.executor.as_ref();
        self.run_committed(conversation_id, CheckpointSource::Turn, |checkpoint| async move {
            if !checkpoint.node.accepts_user_turn() {
                return Err(awaiting_human(&checkpoint));
            }
            let settings = ConversationSettings::from_checkpoint(&checkpoint).turn_settings();
            let outcome = executor
                .run_turn(checkpoint.messages(), Message::user(text), settings)
                .await;
            Ok::<_, SessionError>((checkpoint, outcome))
        })
        .await
    }

    /// Deliver operator input to a suspended conversation and commit the
    /// closing answer.
    pub async fn resume_with_human_input(
        &self,
        conversation_id: &str,
        response: HumanResponse,
    ) -> Result<TurnResult> {
        let executor = self.executor.as_ref();
        let response = &response;
        self.run_committed(conversation_id, CheckpointSource::Resume, |checkpoint| async move {
            let pending = checkpoint
                .pending_interrupt()
                .cloned()
                .ok_or_else(|| SessionError::NotAwaitingHuman(checkpoint.thread_id.clone()))?;
            let settings = ConversationSettings::from_checkpoint(&checkpoint).turn_settings();
            let outcome = executor
                .resume(checkpoint.messages(), &pending, response, settings)
                .await;
            Ok::<_, SessionError>((checkpoint, outcome))
        })
        .await
    }

    /// The visible history: welcome, user messages and assistant answers.
    pub async fn get_history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let checkpoint = self.saver.load_latest(conversation_id).await?;

        let mut history = Vec::with_capacity(checkpoint.state.len() + 1);
        history.extend(checkpoint.welcome.clone());
        history.extend(visible_history(checkpoint.messages()));
        Ok(history)
    }

    /// The suspension the conversation is waiting on, if any.
    pub async fn pending_interrupt(
        &self,
        conversation_id: &str,
    ) -> Result<Option<HumanAssistanceRequest>> {
        let checkpoint = self.saver.load_latest(conversation_id).await?;
        Ok(checkpoint.pending_interrupt().map(HumanAssistanceRequest::from))
    }

    /// Checkpoints of a conversation, newest first.
    pub async fn checkpoints(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>> {
        let stream = self.saver.list(conversation_id, limit).await?;
        let summaries: Vec<_> = stream.collect().await;
        summaries
            .into_iter()
            .map(|s| s.map_err(SessionError::from))
            .collect()
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let _permit = self.acquire(conversation_id).await?;
        self.saver.delete_thread(conversation_id).await?;
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    async fn acquire(&self, conversation_id: &str) -> Result<TurnPermit> {
        let lock = self
            .locks
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .clone();

        let guard = match self.policy {
            BusyPolicy::Queue => lock.lock_owned().await,
            BusyPolicy::Reject => lock
                .try_lock_owned()
                .map_err(|_| SessionError::ConcurrentWriteConflict(conversation_id.to_string()))?,
        };

        Ok(TurnPermit {
            table: Arc::clone(&self.locks),
            conversation_id: conversation_id.to_string(),
            _guard: guard,
        })
    }

    /// Load, compute and commit under the turn lock, recomputing once if
    /// another process committed in between.
    async fn run_committed<F, Fut>(
        &self,
        conversation_id: &str,
        source: CheckpointSource,
        mut turn: F,
    ) -> Result<TurnResult>
    where
        F: FnMut(Checkpoint) -> Fut,
        Fut: Future<Output = Result<(Checkpoint, TurnOutcome)>>,
    {
        let _permit = self.acquire(conversation_id).await?;
        let mut retried = false;

        loop {
            let checkpoint = self.saver.load_latest(conversation_id).await?;
            let (checkpoint, outcome) = turn(checkpoint).await?;

            match self.commit(&checkpoint, outcome, source).await {
                Err(err) if err.is_conflict() && !retried => {
                    warn!(conversation_id, "stream advanced during the turn, recomputing once");
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn commit(
        &self,
        checkpoint: &Checkpoint,
        outcome: TurnOutcome,
        source: CheckpointSource,
    ) -> Result<TurnResult> {
        let mut metadata =
            CheckpointMetadata::new(source).with_status(outcome.result.status.as_str());
        if let Some(usage) = outcome.usage {
            metadata = metadata.with_usage(usage);
        }
        if let Some(interrupt) = outcome.interrupt {
            metadata = metadata.with_pending_interrupt(interrupt);
        }

        let appended = outcome.messages.len();
        let request = AppendRequest::new(checkpoint.id.clone(), outcome.messages, outcome.node)
            .with_metadata(metadata);
        let committed = self.saver.append(&checkpoint.thread_id, request).await?;

        let result = outcome.result;
        info!(
            conversation_id = %committed.thread_id,
            step = committed.step,
            node = %committed.node,
            status = %result.status,
            appended,
            prompt_tokens = result.prompt_tokens,
            completion_tokens = result.completion_tokens,
            "turn committed"
        );
        if let Some(detail) = &result.error_detail {
            warn!(conversation_id = %committed.thread_id, error = %detail, "turn ended with an error");
        }

        if let Some(sink) = &self.usage {
            sink.record_turn(&TurnReport::new(&committed.thread_id, &result)).await;
        }
        Ok(result)
    }
}

fn awaiting_human(checkpoint: &Checkpoint) -> SessionError {
    SessionError::AwaitingHuman {
        conversation_id: checkpoint.thread_id.clone(),
        query: checkpoint
            .pending_interrupt()
            .map(|p| p.query.clone())
            .unwrap_or_default(),
    }
}
