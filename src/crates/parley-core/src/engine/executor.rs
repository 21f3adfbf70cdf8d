//! Runs one turn of the state machine against a model and a tool registry.
//!
//! The executor is pure with respect to storage: it receives the committed
//! history, and returns the messages the turn produced plus the node it
//! ended on. The session manager commits them in one append, so a turn that
//! is cancelled half-way leaves nothing behind.

use super::prompt::{conversational, generate_prompt, resume_prompt};
use super::{
    transition, StepOutcome, TurnResult, TurnStatus, CONNECTION_ERROR_MESSAGE,
    INTERNAL_ERROR_MESSAGE,
};
use crate::config::EngineConfig;
use crate::error::ModelError;
use crate::interrupt::{HumanAssistanceRequest, HumanResponse};
use crate::llm::{ChatModel, ChatRequest, ChatResponse};
use crate::tool::{ToolRegistry, HUMAN_ASSISTANCE_TOOL};
use chrono::Utc;
use futures::future::join_all;
use parley_checkpoint::{EngineNode, Message, PendingInterrupt, Role, TokenUsage, ToolCall};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-conversation generation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnSettings {
    pub temperature: Option<f32>,
}

/// Everything a finished (or suspended) turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Messages to append, in order
    pub messages: Vec<Message>,
    /// `Done`, or `HumanAssistance` when suspended
    pub node: EngineNode,
    /// Usage of the final model call
    pub usage: Option<TokenUsage>,
    pub interrupt: Option<PendingInterrupt>,
    pub result: TurnResult,
}

/// Working copy of a turn: committed history plus what the turn added.
struct TurnRun<'h> {
    history: &'h [Message],
    appended: Vec<Message>,
    usage: Option<TokenUsage>,
    interrupt: Option<PendingInterrupt>,
}

impl<'h> TurnRun<'h> {
    fn new(history: &'h [Message]) -> Self {
        Self {
            history,
            appended: Vec::new(),
            usage: None,
            interrupt: None,
        }
    }

    fn messages(&self) -> Vec<Message> {
        let mut all = Vec::with_capacity(self.history.len() + self.appended.len());
        all.extend_from_slice(self.history);
        all.extend(self.appended.iter().cloned());
        all
    }

    fn last(&self) -> Option<&Message> {
        self.appended.last().or_else(|| self.history.last())
    }

    fn push(&mut self, message: Message) {
        self.appended.push(message);
    }
}

/// Drives turns for any number of conversations.
///
/// Holds no per-conversation state; share it behind an `Arc`.
pub struct TurnExecutor {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl TurnExecutor {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a user turn on top of `history`.
    pub async fn run_turn(
        &self,
        history: &[Message],
        user_message: Message,
        settings: TurnSettings,
    ) -> TurnOutcome {
        let mut run = TurnRun::new(history);
        run.push(user_message);
        self.drive(run, EngineNode::QueryOrRespond, settings).await
    }

    /// Answer a suspension and produce the closing answer.
    ///
    /// The operator's input becomes the result of the pending
    /// `human_assistance` call; the model then answers from it and the
    /// turn's earlier tool results with no tools bound.
    pub async fn resume(
        &self,
        history: &[Message],
        pending: &PendingInterrupt,
        response: &HumanResponse,
        settings: TurnSettings,
    ) -> TurnOutcome {
        let mut run = TurnRun::new(history);
        run.push(Message::tool(
            response.data.clone(),
            pending.tool_call_id.clone(),
            HUMAN_ASSISTANCE_TOOL,
        ));

        let node = EngineNode::HumanAssistance;
        let request = self.request(resume_prompt(&run.messages()), settings, false);
        match self.call_model(node, request).await {
            Ok(response) => {
                let message = self.accept_response(&mut run, response);
                let answer = strip_tool_calls(message);
                run.push(answer);
                match transition(node, StepOutcome::HumanInputReceived) {
                    Some(next) => self.finish(run, next),
                    None => self.fail(run, node, ModelError::failure("invalid resume transition")),
                }
            }
            Err(err) => self.fail(run, node, err),
        }
    }

    async fn drive(&self, mut run: TurnRun<'_>, start: EngineNode, settings: TurnSettings) -> TurnOutcome {
        let mut node = start;

        while !matches!(node, EngineNode::Done | EngineNode::HumanAssistance) {
            let step = match node {
                EngineNode::QueryOrRespond => self.query_or_respond(&mut run, settings).await,
                EngineNode::ToolDispatch => Ok(self.dispatch_tools(&mut run).await),
                EngineNode::Generate => self.generate(&mut run, settings).await,
                EngineNode::HumanAssistance | EngineNode::Done => break,
            };

            let outcome = match step {
                Ok(outcome) => outcome,
                Err(err) => return self.fail(run, node, err),
            };

            node = match transition(node, outcome) {
                Some(next) => next,
                None => {
                    let err = ModelError::failure(format!("no edge from {} on {:?}", node, outcome));
                    return self.fail(run, node, err);
                }
            };
            debug!(node = %node, outcome = ?outcome, "engine transition");
        }

        self.finish(run, node)
    }

    async fn query_or_respond(
        &self,
        run: &mut TurnRun<'_>,
        settings: TurnSettings,
    ) -> Result<StepOutcome, ModelError> {
        let request = self
            .request(run.messages(), settings, false)
            .with_tools(self.tools.definitions());
        let response = self.call_model(EngineNode::QueryOrRespond, request).await?;
        let message = self.accept_response(run, response);

        let outcome = if message.has_tool_calls() {
            StepOutcome::ToolCallsRequested
        } else {
            StepOutcome::Answered
        };
        run.push(message);
        Ok(outcome)
    }

    async fn dispatch_tools(&self, run: &mut TurnRun<'_>) -> StepOutcome {
        let calls: Vec<ToolCall> = run
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        let started = Instant::now();
        let results = join_all(calls.iter().map(|call| self.run_tool_call(call))).await;
        info!(
            calls = calls.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool dispatch finished"
        );

        for message in results {
            run.push(message);
        }
        StepOutcome::ToolsCompleted
    }

    async fn run_tool_call(&self, call: &ToolCall) -> Message {
        let invoked = match self.tools.resolve(&call.name) {
            Ok(spec) => self.tools.invoke(spec, call.arguments.clone()).await,
            Err(err) => Err(err),
        };
        match invoked {
            Ok(result) => {
                let message = Message::tool(result.content, call.id.clone(), call.name.clone());
                if result.truncated {
                    message.with_metadata("truncated", true)
                } else {
                    message
                }
            }
            Err(err) => {
                warn!(tool = %call.name, call_id = %call.id, kind = %err.kind, error = %err.message, "tool call failed");
                Message::tool(err.to_tool_content(), call.id.clone(), call.name.clone())
                    .with_metadata("error_kind", err.kind.as_str())
            }
        }
    }

    async fn generate(
        &self,
        run: &mut TurnRun<'_>,
        settings: TurnSettings,
    ) -> Result<StepOutcome, ModelError> {
        let request = self
            .request(generate_prompt(&run.messages()), settings, true)
            .with_tools(vec![self.tools.human_assistance()]);
        let response = self.call_model(EngineNode::Generate, request).await?;
        let mut message = self.accept_response(run, response);

        let escalation = message
            .tool_calls
            .iter()
            .find(|c| c.name == HUMAN_ASSISTANCE_TOOL)
            .cloned();
        let dropped = message
            .tool_calls
            .iter()
            .filter(|c| c.name != HUMAN_ASSISTANCE_TOOL)
            .count();
        if dropped > 0 {
            warn!(dropped, "generate returned calls to unbound tools, ignoring them");
        }

        match escalation {
            Some(call) => {
                let query = call
                    .str_arg("query")
                    .map(str::to_string)
                    .unwrap_or_else(|| call.arguments.to_string());
                info!(call_id = %call.id, "model requested human assistance");
                run.interrupt = Some(PendingInterrupt {
                    tool_call_id: call.id.clone(),
                    query,
                    raised_at: message.created_at,
                });
                message.tool_calls = vec![call];
                run.push(message);
                Ok(StepOutcome::HumanAssistanceRequested)
            }
            None => {
                run.push(strip_tool_calls(message));
                Ok(StepOutcome::Answered)
            }
        }
    }

    fn request(&self, messages: Vec<Message>, settings: TurnSettings, capped: bool) -> ChatRequest {
        let mut request = ChatRequest::new(messages);
        if let Some(temperature) = settings.temperature {
            request = request.with_temperature(temperature);
        }
        if capped {
            if let Some(max_tokens) = self.config.generate_max_tokens {
                request = request.with_max_tokens(max_tokens);
            }
        }
        request
    }

    async fn call_model(&self, node: EngineNode, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let started = Instant::now();
        let deadline = self.config.model_timeout;
        let response = tokio::time::timeout(deadline, self.model.chat(request))
            .await
            .map_err(|_| ModelError::Timeout(deadline))??;

        debug!(
            node = %node,
            model = self.model.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            tool_calls = response.message.tool_calls.len(),
            "model call completed"
        );
        Ok(response)
    }

    /// Stamp a model response and record its usage as the turn's latest.
    fn accept_response(&self, run: &mut TurnRun<'_>, response: ChatResponse) -> Message {
        let usage: Option<TokenUsage> = response.usage.map(Into::into);
        run.usage = Some(usage.unwrap_or_default());

        let mut message = response.message.with_created_at(Utc::now());
        message.role = Role::Assistant;
        message.usage = usage;
        message
    }

    fn finish(&self, run: TurnRun<'_>, node: EngineNode) -> TurnOutcome {
        let message = run
            .appended
            .last()
            .cloned()
            .unwrap_or_else(|| Message::assistant(""));
        let usage = run.usage.unwrap_or_default();
        let interrupt = if node == EngineNode::HumanAssistance {
            run.interrupt.clone()
        } else {
            None
        };
        let status = if interrupt.is_some() {
            TurnStatus::AwaitingHuman
        } else {
            TurnStatus::Answered
        };

        TurnOutcome {
            result: TurnResult {
                timestamp: message.created_at,
                message,
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                status,
                interrupt: interrupt.as_ref().map(HumanAssistanceRequest::from),
                error_detail: None,
            },
            messages: run.appended,
            node,
            usage: run.usage,
            interrupt,
        }
    }

    fn fail(&self, mut run: TurnRun<'_>, node: EngineNode, err: ModelError) -> TurnOutcome {
        let status = if err.is_unavailable() {
            TurnStatus::ConnectionError
        } else {
            TurnStatus::InternalError
        };
        warn!(node = %node, status = %status, error = %err, "turn failed");

        let text = match status {
            TurnStatus::ConnectionError => CONNECTION_ERROR_MESSAGE,
            _ => INTERNAL_ERROR_MESSAGE,
        };
        let mut message = Message::assistant(text).with_metadata("status", status.as_str());
        if status == TurnStatus::InternalError {
            message = message.with_metadata("error_details", err.to_string());
        }
        run.push(message.clone());

        TurnOutcome {
            result: TurnResult {
                timestamp: message.created_at,
                message,
                prompt_tokens: 0,
                completion_tokens: 0,
                status,
                interrupt: None,
                error_detail: Some(err.to_string()),
            },
            messages: run.appended,
            node: transition(node, StepOutcome::Failed).unwrap_or(EngineNode::Done),
            usage: None,
            interrupt: None,
        }
    }
}

fn strip_tool_calls(mut message: Message) -> Message {
    message.tool_calls.clear();
    message
}

/// Messages a user would see for `history`, without the welcome entry.
pub(crate) fn visible_history(history: &[Message]) -> Vec<Message> {
    conversational(history)
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect()
}
