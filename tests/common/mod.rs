//! Shared test helpers and mock provider.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use colloquy::agent_loop::{RunEvent, RunEventSink};
use colloquy::error::ColloquyError;
use colloquy::provider::{ModelProvider, ModelResult, ProviderRequest};
use colloquy::tools::{AgentTool, Tool, ToolErrorPolicy, ToolParameters};
use colloquy::types::{Message, ToolCall};

enum Scripted {
    Reply(ModelResult),
    Fail(String),
}

/// A mock provider that returns canned responses in order.
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a final text response.
    pub fn queue_response(&self, text: &str) {
        self.push(Scripted::Reply(ModelResult::Final(Message::assistant(text))));
    }

    /// Queue a single tool call response.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue_tool_calls(&[(id, name, args)]);
    }

    /// Queue one response requesting several tool calls.
    pub fn queue_tool_calls(&self, calls: &[(&str, &str, serde_json::Value)]) {
        self.queue_text_then_tool_calls("", calls);
    }

    /// Queue a tool-call response that starts with assistant text.
    pub fn queue_text_then_tool_calls(&self, text: &str, calls: &[(&str, &str, serde_json::Value)]) {
        let calls = calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, args.to_string()))
            .collect();
        self.push(Scripted::Reply(ModelResult::ToolCalls(Message::tool_call(text, calls))));
    }

    /// Delay every invocation by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn queue_error(&self, message: &str) {
        self.push(Scripted::Fail(message.to_string()));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, item: Scripted) {
        self.responses.lock().unwrap().push(item);
    }

    fn next(&self, request: &ProviderRequest) -> Result<ModelResult, ColloquyError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(ModelResult::Final(Message::assistant("Mock response")));
        }
        match responses.remove(0) {
            Scripted::Reply(result) => Ok(result),
            Scripted::Fail(message) => Err(ColloquyError::provider("mock", message)),
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ModelResult, ColloquyError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next(request)
    }

    /// Splits text into five-character deltas and tool-call arguments into two fragments.
    /// Text of a tool-call response streams first, as assistant deltas.
    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<Message, ColloquyError>>, ColloquyError> {
        let deltas: Vec<Message> = match self.next(request)? {
            ModelResult::Final(message) => text_deltas(message.content()),
            ModelResult::ToolCalls(message) => {
                let mut deltas = text_deltas(message.content());
                deltas.extend(message.tool_calls().iter().flat_map(|call| {
                    let middle = call
                        .arguments
                        .char_indices()
                        .nth(call.arguments.chars().count() / 2)
                        .map_or(call.arguments.len(), |(index, _)| index);
                    let (head, tail) = call.arguments.split_at(middle);
                    [
                        Message::tool_call("", vec![ToolCall::new(&call.id, &call.name, head)]),
                        Message::tool_call("", vec![ToolCall::new(&call.id, "", tail)]),
                    ]
                }));
                deltas
            }
        };

        let stream = async_stream::stream! {
            for delta in deltas {
                yield Ok(delta);
            }
        };
        Ok(Box::pin(stream))
    }
}

fn text_deltas(text: &str) -> Vec<Message> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(5)
        .map(|chunk| Message::assistant(chunk.iter().collect::<String>()))
        .collect()
}

/// Event sink that records every event.
pub fn recording_sink() -> (RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    let sink: RunEventSink = Arc::new(move |event| captured.lock().unwrap().push(event));
    (sink, events)
}

/// `add(a, b)` returning the integer sum.
pub fn add_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "add",
        "Add two integers",
        ToolParameters::from_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" },
            },
            "required": ["a", "b"],
        })),
        |args, _ctx| async move { Ok(serde_json::json!(args.get_i64("a")? + args.get_i64("b")?)) },
    ))
}

/// A tool that requires approval before it runs.
pub fn deploy_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "deploy",
            "Deploy to an environment",
            ToolParameters::from_schema(serde_json::json!({
                "type": "object",
                "properties": { "env": { "type": "string" } },
                "required": ["env"],
            })),
            |args, _ctx| async move {
                Ok(serde_json::json!({ "deployed": args.get_str("env")? }))
            },
        )
        .with_approval(),
    )
}

/// A tool that always fails and stops the loop when it does.
pub fn strict_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "strict",
            "Fails and aborts the loop",
            ToolParameters::empty(),
            |_args, _ctx| async move {
                Err(ColloquyError::tool_execution("strict", "refused to continue"))
            },
        )
        .with_error_policy(ToolErrorPolicy::FailFast),
    )
}

/// A tool that takes an hour to finish.
pub fn slow_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "slow",
        "Sleeps for an hour",
        ToolParameters::empty(),
        |_args, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::json!("done"))
        },
    ))
}
