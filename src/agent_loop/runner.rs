//! The tool-call loop.
//!
//! One invocation alternates between asking the model for the next message
//! and executing the tool calls it requests, appending every message to the
//! conversation as it goes, until the model answers without tool calls.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::approvals::{ApprovalManager, ApprovalPolicy, PermissionRequest};
use super::events::{
    RunEventEmitter, RunEventPayload, RunEventSink, RunEventStream, RunLifecycle,
};
use crate::agent::Conversation;
use crate::config::LoopConfig;
use crate::error::ColloquyError;
use crate::provider::{ModelProvider, ModelResult, ProviderRequest, ToolDefinition};
use crate::stream_transform::aggregate_messages;
use crate::tools::{Tool, ToolErrorPolicy, ToolExecutionContext, ToolExecutor, ToolRegistry};
use crate::types::{Message, MessageKind, ToolCall, ToolResponse};
use crate::util::with_optional_timeout;

/// Payload reported for calls that never ran because the invocation was cancelled.
const CANCELED_PAYLOAD: &str = "canceled";

/// Drives a conversation through model invocations and tool rounds.
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use colloquy::prelude::*;
/// # async fn demo(provider: Arc<dyn ModelProvider>) -> colloquy::error::Result<()> {
/// let tool_loop = ToolCallLoop::new(provider, Arc::new(ToolRegistry::new()));
/// let mut conversation = Conversation::new();
/// let answer = tool_loop
///     .run(&mut conversation, vec![Message::user("hi")], &CancellationToken::new())
///     .await?;
/// println!("{}", answer.content());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ToolCallLoop {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    executor: ToolExecutor,
    approvals: Option<ApprovalManager>,
    config: LoopConfig,
    event_sink: Option<RunEventSink>,
}

impl std::fmt::Debug for ToolCallLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallLoop")
            .field("provider", &self.provider.provider_name())
            .field("tools", &self.tools)
            .field("approvals", &self.approvals)
            .field("config", &self.config)
            .finish()
    }
}

/// Responses gathered for one round, plus the error that cut it short.
struct RoundOutcome {
    responses: Vec<Option<ToolResponse>>,
    error: Option<ColloquyError>,
}

impl ToolCallLoop {
    pub fn new(provider: Arc<dyn ModelProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            executor: ToolExecutor::default(),
            approvals: None,
            config: LoopConfig::default(),
            event_sink: None,
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_approvals(mut self, manager: ApprovalManager) -> Self {
        self.approvals = Some(manager);
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Append `input` and loop until the model produces a final message.
    ///
    /// Returns that final message, which is also the last message of the
    /// conversation. On error the conversation keeps everything appended so
    /// far; a round cut short still gets a response for every requested call.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        input: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Message, ColloquyError> {
        let emitter = RunEventEmitter::new(Uuid::new_v4(), self.event_sink.clone());
        emitter.lifecycle(RunLifecycle::Started);

        let result = self.drive(&emitter, conversation, input, cancel).await;
        match &result {
            Ok(_) => emitter.lifecycle(RunLifecycle::Completed),
            Err(ColloquyError::Canceled) => emitter.lifecycle(RunLifecycle::Canceled),
            Err(err) => emitter.lifecycle(RunLifecycle::Failed {
                error: err.to_string(),
            }),
        }
        result
    }

    async fn drive(
        &self,
        emitter: &RunEventEmitter,
        conversation: &mut Conversation,
        input: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Message, ColloquyError> {
        if cancel.is_cancelled() {
            return Err(ColloquyError::Canceled);
        }

        conversation.new_turn();
        for message in input {
            append(emitter, conversation, message);
        }

        let definitions = self.tools.definitions();
        let mut rounds = 0usize;
        loop {
            let request = self.build_request(conversation, &definitions);
            let result = tokio::select! {
                result = self.call_model(emitter, &request) => result?,
                _ = cancel.cancelled() => return Err(ColloquyError::Canceled),
            };

            let message = match result {
                ModelResult::Final(message) => {
                    append(emitter, conversation, message.clone());
                    conversation.finish_turn();
                    tracing::debug!(
                        conversation_id = conversation.id(),
                        run_id = %emitter.run_id(),
                        rounds,
                        "tool-call loop finished"
                    );
                    return Ok(message);
                }
                ModelResult::ToolCalls(message) => message,
            };

            if rounds >= self.config.max_tool_rounds {
                tracing::warn!(
                    conversation_id = conversation.id(),
                    limit = self.config.max_tool_rounds,
                    "tool round limit reached"
                );
                return Err(ColloquyError::MaxToolTurnsExceeded {
                    limit: self.config.max_tool_rounds,
                });
            }
            rounds += 1;

            let calls = message.tool_calls().to_vec();
            tracing::debug!(
                conversation_id = conversation.id(),
                round = rounds,
                calls = calls.len(),
                "executing tool round"
            );
            append(emitter, conversation, message);

            let outcome = self
                .execute_round(emitter, conversation.id(), &calls, cancel)
                .await;
            let responses = fill_missing(&calls, outcome.responses, outcome.error.as_ref());
            append(emitter, conversation, Message::tool_response(responses));

            if let Some(err) = outcome.error {
                return Err(err);
            }
        }
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        definitions: &[ToolDefinition],
    ) -> ProviderRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            if !conversation.messages().any(Message::is_system) {
                messages.push(Message::system(prompt.clone()));
            }
        }
        messages.extend(conversation.messages().cloned());
        ProviderRequest {
            messages,
            tools: definitions.to_vec(),
            settings: self.config.settings.clone(),
        }
    }

    async fn call_model(
        &self,
        emitter: &RunEventEmitter,
        request: &ProviderRequest,
    ) -> Result<ModelResult, ColloquyError> {
        let invocation = async {
            if self.config.streaming {
                self.stream_model(emitter, request).await
            } else {
                self.provider.invoke(request).await
            }
        };
        with_optional_timeout(self.config.provider_timeout, invocation).await
    }

    async fn stream_model(
        &self,
        emitter: &RunEventEmitter,
        request: &ProviderRequest,
    ) -> Result<ModelResult, ColloquyError> {
        let deltas = self.provider.stream(request).await?;
        let forwarded = deltas.inspect(|item| {
            if let Ok(delta) = item {
                let text = delta.content();
                if !text.is_empty() && delta.kind() != MessageKind::System {
                    emitter.emit(
                        RunEventStream::Assistant,
                        RunEventPayload::AssistantDelta {
                            text: text.to_string(),
                        },
                    );
                }
            }
        });
        let messages: Vec<Message> = aggregate_messages(forwarded.boxed()).try_collect().await?;
        ModelResult::from_messages(messages)
    }

    async fn execute_round(
        &self,
        emitter: &RunEventEmitter,
        conversation_id: &str,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> RoundOutcome {
        if self.config.parallel_tools {
            let runs = calls
                .iter()
                .map(|call| self.run_call(emitter, conversation_id, call, cancel));
            let mut outcome = RoundOutcome {
                responses: Vec::with_capacity(calls.len()),
                error: None,
            };
            for result in futures::future::join_all(runs).await {
                match result {
                    Ok(response) => outcome.responses.push(Some(response)),
                    Err(err) => {
                        outcome.responses.push(None);
                        outcome.error.get_or_insert(err);
                    }
                }
            }
            return outcome;
        }

        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                return RoundOutcome {
                    responses,
                    error: Some(ColloquyError::Canceled),
                };
            }
            match self.run_call(emitter, conversation_id, call, cancel).await {
                Ok(response) => responses.push(Some(response)),
                Err(err) => {
                    return RoundOutcome {
                        responses,
                        error: Some(err),
                    }
                }
            }
        }
        RoundOutcome {
            responses,
            error: None,
        }
    }

    /// Resolve, authorize and execute one call.
    ///
    /// `Err` means the whole invocation must stop; recoverable failures come
    /// back as error responses.
    async fn run_call(
        &self,
        emitter: &RunEventEmitter,
        conversation_id: &str,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, ColloquyError> {
        emitter.emit(
            RunEventStream::Tool,
            RunEventPayload::ToolCallStarted { call: call.clone() },
        );

        let response = match self.tools.resolve(&call.name) {
            Ok(tool) => {
                let policy = match self.config.tool_error_policy {
                    ToolErrorPolicy::FailFast => ToolErrorPolicy::FailFast,
                    ToolErrorPolicy::Resilient => tool.error_policy(),
                };
                let result = match self
                    .authorize(emitter, conversation_id, tool.as_ref(), call, cancel)
                    .await
                {
                    Ok(()) => {
                        self.execute_tool(conversation_id, tool.as_ref(), call, cancel)
                            .await
                    }
                    Err(err) => Err(err),
                };
                match result {
                    Ok(value) => ToolResponse::success(&call.id, &call.name, &value),
                    Err(err) => recover(call, err, policy)?,
                }
            }
            Err(err) => recover(call, err, self.config.tool_error_policy)?,
        };

        emitter.emit(
            RunEventStream::Tool,
            RunEventPayload::ToolResult {
                response: response.clone(),
            },
        );
        Ok(response)
    }

    async fn execute_tool(
        &self,
        conversation_id: &str,
        tool: &dyn Tool,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ColloquyError> {
        let ctx = ToolExecutionContext::for_call(&call.id, &call.name)
            .with_conversation(conversation_id)
            .with_cancel(cancel.child_token());
        tokio::select! {
            result = self.executor.execute(&ctx, tool, &call.arguments) => result,
            _ = cancel.cancelled() => {
                self.executor.notify_canceled(&ctx, tool.name());
                Err(ColloquyError::Canceled)
            }
        }
    }

    async fn authorize(
        &self,
        emitter: &RunEventEmitter,
        conversation_id: &str,
        tool: &dyn Tool,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<(), ColloquyError> {
        if !tool.requires_approval() {
            return Ok(());
        }
        let manager = match self.config.approval_policy {
            ApprovalPolicy::Always => return Ok(()),
            ApprovalPolicy::Never => {
                return Err(rejected(call, "approval policy declines this tool"));
            }
            ApprovalPolicy::Ask => match &self.approvals {
                Some(manager) => manager,
                None => return Err(rejected(call, "no approval manager configured")),
            },
        };

        let request = PermissionRequest::new(&call.name, &call.arguments)
            .with_reason(format!("Tool: {}", call.name))
            .with_context("conversation_id", serde_json::json!(conversation_id))
            .with_context("tool_call_id", serde_json::json!(call.id));
        emitter.emit(
            RunEventStream::Approval,
            RunEventPayload::ApprovalRequired {
                request: request.clone(),
            },
        );

        let pending = manager.initiate_approval(request);
        let request_id = pending.request_id().to_string();
        let decision = pending.wait(cancel, self.config.approval_timeout).await;
        // A closed manager means the owning context shut down.
        if cancel.is_cancelled() || manager.is_closed() {
            return Err(ColloquyError::Canceled);
        }
        let approval = decision?;
        emitter.emit(
            RunEventStream::Approval,
            RunEventPayload::ApprovalResolved {
                request_id,
                status: approval.status,
            },
        );

        if approval.is_approved() {
            Ok(())
        } else {
            let reason = approval
                .content
                .unwrap_or_else(|| "denied by approver".to_string());
            Err(rejected(call, &reason))
        }
    }
}

fn append(emitter: &RunEventEmitter, conversation: &mut Conversation, message: Message) {
    conversation.append_message(message.clone());
    emitter.emit(
        RunEventStream::Conversation,
        RunEventPayload::MessageAppended { message },
    );
}

fn rejected(call: &ToolCall, reason: &str) -> ColloquyError {
    ColloquyError::ToolRejected {
        tool_name: call.name.clone(),
        reason: reason.to_string(),
    }
}

/// Turn a failed call into an error response, or stop the invocation.
fn recover(
    call: &ToolCall,
    err: ColloquyError,
    policy: ToolErrorPolicy,
) -> Result<ToolResponse, ColloquyError> {
    match err {
        ColloquyError::Canceled => Err(err),
        err if policy == ToolErrorPolicy::FailFast => Err(err),
        err => {
            tracing::warn!(tool = %call.name, tool_call_id = %call.id, error = %err, "tool call failed");
            Ok(ToolResponse::error(&call.id, &call.name, err.to_string()))
        }
    }
}

/// One response per call, in call order. Calls that produced nothing get an
/// error payload describing why the round stopped.
fn fill_missing(
    calls: &[ToolCall],
    mut responses: Vec<Option<ToolResponse>>,
    error: Option<&ColloquyError>,
) -> Vec<ToolResponse> {
    responses.resize(calls.len(), None);
    let reason = match error {
        Some(ColloquyError::Canceled) | None => CANCELED_PAYLOAD.to_string(),
        Some(err) => err.to_string(),
    };
    calls
        .iter()
        .zip(responses)
        .map(|(call, response)| {
            response.unwrap_or_else(|| ToolResponse::error(&call.id, &call.name, reason.clone()))
        })
        .collect()
}
