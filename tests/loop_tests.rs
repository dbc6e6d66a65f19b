//! Tests for the tool-call loop.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use colloquy::agent::Conversation;
use colloquy::agent_loop::{RunEventPayload, RunLifecycle, ToolCallLoop};
use colloquy::config::LoopConfig;
use colloquy::error::ColloquyError;
use colloquy::tools::{
    ListenerResult, ToolArguments, ToolExecutionContext, ToolExecutor, ToolListener, ToolRegistry,
    ToolStage,
};
use colloquy::types::{MessageKind, ToolResponse};
use common::{add_tool, recording_sink, slow_tool, strict_tool, MockProvider};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new().with_tool(add_tool()))
}

fn kinds(conversation: &Conversation) -> Vec<MessageKind> {
    conversation.messages().map(|m| m.kind()).collect()
}

#[tokio::test]
async fn tool_round_then_final_appends_three_messages() {
    let provider = MockProvider::new();
    provider.queue_tool_call("c1", "add", serde_json::json!({"a": 2, "b": 3}));
    provider.queue_response("2 + 3 = 5");

    let tool_loop = ToolCallLoop::new(provider.clone(), registry());
    let mut conversation = Conversation::new();
    let answer = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("add 2 and 3")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(answer.content(), "2 + 3 = 5");
    assert_eq!(
        kinds(&conversation),
        vec![
            MessageKind::Role,
            MessageKind::ToolCall,
            MessageKind::ToolResponse,
            MessageKind::Role,
        ]
    );
    let responses = conversation.messages().nth(2).unwrap().tool_responses().to_vec();
    assert_eq!(responses, vec![ToolResponse::success("c1", "add", &serde_json::json!(5))]);
    assert_eq!(conversation.last_message().unwrap().id, answer.id);
    assert!(conversation.turns().last().unwrap().is_finished());

    // The second request carries the tool round.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn exceeding_round_limit_stops_before_appending() {
    let provider = MockProvider::new();
    for i in 0..3 {
        provider.queue_tool_call(&format!("c{i}"), "add", serde_json::json!({"a": i, "b": 1}));
    }

    let config = LoopConfig::builder().max_tool_rounds(2).build();
    let tool_loop = ToolCallLoop::new(provider, registry()).with_config(config);
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("loop forever")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::MaxToolTurnsExceeded { limit: 2 }));
    assert_eq!(err.to_string(), "Tool loop exceeded 2 tool rounds");
    // Input plus two complete rounds; the third request left no trace.
    assert_eq!(conversation.len(), 5);
    assert_eq!(
        conversation.last_message().unwrap().kind(),
        MessageKind::ToolResponse
    );
    assert!(conversation
        .messages()
        .all(|m| m.tool_calls().iter().all(|c| c.id != "c2")));
}

#[tokio::test]
async fn every_append_is_reported_in_order() {
    let provider = MockProvider::new();
    provider.queue_tool_call("c1", "add", serde_json::json!({"a": 1, "b": 1}));
    provider.queue_response("2");

    let (sink, events) = recording_sink();
    let tool_loop = ToolCallLoop::new(provider, registry()).with_event_sink(sink);
    let mut conversation = Conversation::new();
    tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("1+1")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let appended: Vec<String> = events
        .iter()
        .filter_map(|e| match &e.payload {
            RunEventPayload::MessageAppended { message } => Some(message.id.clone()),
            _ => None,
        })
        .collect();
    let logged: Vec<String> = conversation.messages().map(|m| m.id.clone()).collect();
    assert_eq!(appended, logged);

    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert!(matches!(
        events.first().map(|e| &e.payload),
        Some(RunEventPayload::Lifecycle { state: RunLifecycle::Started })
    ));
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(RunEventPayload::Lifecycle { state: RunLifecycle::Completed })
    ));
}

#[tokio::test]
async fn streaming_mode_aggregates_deltas() {
    let provider = MockProvider::new();
    provider.queue_tool_call("c1", "add", serde_json::json!({"a": 40, "b": 2}));
    provider.queue_response("The answer is 42");

    let (sink, events) = recording_sink();
    let config = LoopConfig::builder().streaming(true).build();
    let tool_loop = ToolCallLoop::new(provider, registry())
        .with_config(config)
        .with_event_sink(sink);
    let mut conversation = Conversation::new();
    let answer = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("what is 40+2")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(answer.content(), "The answer is 42");
    let call = &conversation.messages().nth(1).unwrap().tool_calls()[0];
    assert_eq!(call.arguments, r#"{"a":40,"b":2}"#);
    assert_eq!(
        conversation.messages().nth(2).unwrap().tool_responses()[0].response_data,
        "42"
    );

    let deltas: String = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match &e.payload {
            RunEventPayload::AssistantDelta { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, "The answer is 42");
}

#[tokio::test]
async fn parallel_round_keeps_request_order() {
    let provider = MockProvider::new();
    provider.queue_tool_calls(&[
        ("first", "add", serde_json::json!({"a": 1, "b": 1})),
        ("second", "missing", serde_json::json!({})),
        ("third", "add", serde_json::json!({"a": 2, "b": 2})),
    ]);
    provider.queue_response("done");

    let config = LoopConfig::builder().parallel_tools(true).build();
    let tool_loop = ToolCallLoop::new(provider, registry()).with_config(config);
    let mut conversation = Conversation::new();
    tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("go")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let responses = conversation.messages().nth(2).unwrap().tool_responses().to_vec();
    let ids: Vec<&str> = responses.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(responses[0].response_data, "2");
    assert!(responses[1].is_error);
    assert_eq!(responses[2].response_data, "4");
}

#[tokio::test]
async fn provider_failure_propagates_after_input() {
    let provider = MockProvider::new();
    provider.queue_error("rate limited");

    let tool_loop = ToolCallLoop::new(provider, registry());
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("hello")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::Provider { .. }));
    assert!(err.is_retryable());
    assert_eq!(conversation.len(), 1);
}

struct Exploding;

impl ToolListener for Exploding {
    fn on_tool_input(
        &self,
        _ctx: &ToolExecutionContext,
        _args: &colloquy::tools::ToolArguments,
    ) -> ListenerResult {
        panic!("listener bug");
    }

    fn on_tool_output(
        &self,
        _ctx: &ToolExecutionContext,
        _output: &serde_json::Value,
    ) -> ListenerResult {
        Err(ColloquyError::InvalidState("listener refused".into()))
    }
}

#[tokio::test]
async fn failing_listeners_do_not_affect_the_loop() {
    let provider = MockProvider::new();
    provider.queue_tool_call("c1", "add", serde_json::json!({"a": 1, "b": 2}));
    provider.queue_response("3");

    let executor = ToolExecutor::default();
    executor.add_listener(Arc::new(Exploding));
    let tool_loop = ToolCallLoop::new(provider, registry()).with_executor(executor.clone());
    let mut conversation = Conversation::new();
    let answer = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("1+2")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(answer.content(), "3");
    assert_eq!(
        conversation.messages().nth(2).unwrap().tool_responses()[0].response_data,
        "3"
    );
    assert_eq!(executor.listeners().failure_count(), 2);
}

#[tokio::test]
async fn streaming_keeps_text_before_tool_calls() {
    let provider = MockProvider::new();
    provider.queue_text_then_tool_calls(
        "Let me check. ",
        &[("c1", "add", serde_json::json!({"a": 1, "b": 2}))],
    );
    provider.queue_response("3");

    let config = LoopConfig::builder().streaming(true).build();
    let tool_loop = ToolCallLoop::new(provider.clone(), registry()).with_config(config);
    let mut conversation = Conversation::new();
    tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("1+2")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let call_message = conversation.messages().nth(1).unwrap();
    assert_eq!(call_message.kind(), MessageKind::ToolCall);
    assert_eq!(call_message.content(), "Let me check. ");
    assert_eq!(call_message.tool_calls()[0].arguments, r#"{"a":1,"b":2}"#);
    assert_eq!(provider.requests()[1].messages[1].content(), "Let me check. ");
}

#[tokio::test(start_paused = true)]
async fn slow_provider_hits_the_timeout() {
    let provider = MockProvider::new();
    provider.set_delay(Duration::from_secs(60));
    provider.queue_response("too late");

    let config = LoopConfig::builder()
        .provider_timeout(Duration::from_secs(5))
        .build();
    let tool_loop = ToolCallLoop::new(provider, registry()).with_config(config);
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("hello")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::Timeout(5000)));
    assert_eq!(conversation.len(), 1);
}

fn strict_registry() -> Arc<ToolRegistry> {
    Arc::new(
        ToolRegistry::new()
            .with_tool(add_tool())
            .with_tool(strict_tool()),
    )
}

#[tokio::test]
async fn fail_fast_tool_stops_a_resilient_loop() {
    let provider = MockProvider::new();
    provider.queue_tool_calls(&[
        ("c1", "strict", serde_json::json!({})),
        ("c2", "add", serde_json::json!({"a": 1, "b": 1})),
    ]);
    provider.queue_response("never requested");

    let tool_loop = ToolCallLoop::new(provider.clone(), strict_registry());
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("go")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::ToolExecution { .. }));
    assert_eq!(provider.requests().len(), 1);
    let responses = conversation.last_message().unwrap().tool_responses().to_vec();
    let ids: Vec<&str> = responses.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert!(responses.iter().all(|r| r.is_error));
    assert!(responses[0].response_data.contains("refused to continue"));
}

#[tokio::test]
async fn fail_fast_in_parallel_round_keeps_other_results() {
    let provider = MockProvider::new();
    provider.queue_tool_calls(&[
        ("first", "add", serde_json::json!({"a": 1, "b": 1})),
        ("second", "strict", serde_json::json!({})),
        ("third", "add", serde_json::json!({"a": 2, "b": 2})),
    ]);

    let config = LoopConfig::builder().parallel_tools(true).build();
    let tool_loop = ToolCallLoop::new(provider.clone(), strict_registry()).with_config(config);
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(
            &mut conversation,
            vec![colloquy::types::Message::user("go")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::ToolExecution { .. }));
    assert_eq!(provider.requests().len(), 1);
    let responses = conversation.last_message().unwrap().tool_responses().to_vec();
    let ids: Vec<&str> = responses.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(responses[0].response_data, "2");
    assert!(responses[1].is_error);
    assert_eq!(responses[2].response_data, "4");
}

/// Records listener stages and cancels the run once the tool starts.
struct CancelOnInput {
    token: CancellationToken,
    stages: Mutex<Vec<ToolStage>>,
}

impl CancelOnInput {
    fn record(&self, stage: ToolStage) -> ListenerResult {
        self.stages.lock().unwrap().push(stage);
        Ok(())
    }
}

impl ToolListener for CancelOnInput {
    fn on_tool_input_request(&self, _ctx: &ToolExecutionContext, _raw_input: &str) -> ListenerResult {
        self.record(ToolStage::InputRequest)
    }

    fn on_tool_input(&self, _ctx: &ToolExecutionContext, _args: &ToolArguments) -> ListenerResult {
        self.token.cancel();
        self.record(ToolStage::Input)
    }

    fn on_tool_output(&self, _ctx: &ToolExecutionContext, _output: &serde_json::Value) -> ListenerResult {
        self.record(ToolStage::Output)
    }

    fn on_tool_exception(&self, _ctx: &ToolExecutionContext, error: &ColloquyError) -> ListenerResult {
        assert!(matches!(error, ColloquyError::Canceled));
        self.record(ToolStage::Exception)
    }

    fn on_tool_response(&self, _ctx: &ToolExecutionContext, response: &ToolResponse) -> ListenerResult {
        assert!(response.is_error);
        self.record(ToolStage::Response)
    }
}

#[tokio::test]
async fn cancelling_a_running_tool_aborts_and_closes_listeners() {
    let provider = MockProvider::new();
    provider.queue_tool_call("c1", "slow", serde_json::json!({}));

    let cancel = CancellationToken::new();
    let listener = Arc::new(CancelOnInput {
        token: cancel.clone(),
        stages: Mutex::new(Vec::new()),
    });
    let executor = ToolExecutor::default();
    executor.add_listener(listener.clone());
    let tool_loop = ToolCallLoop::new(
        provider.clone(),
        Arc::new(ToolRegistry::new().with_tool(slow_tool())),
    )
    .with_executor(executor);
    let mut conversation = Conversation::new();
    let err = tool_loop
        .run(&mut conversation, vec![colloquy::types::Message::user("wait")], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::Canceled));
    assert_eq!(provider.requests().len(), 1);
    let response = &conversation.last_message().unwrap().tool_responses()[0];
    assert_eq!(response.id, "c1");
    assert_eq!(response.response_data, r#"{"error":"canceled"}"#);
    assert_eq!(
        *listener.stages.lock().unwrap(),
        vec![
            ToolStage::InputRequest,
            ToolStage::Input,
            ToolStage::Exception,
            ToolStage::Response,
        ]
    );
}
