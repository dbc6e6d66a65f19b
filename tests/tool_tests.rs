//! Tests for the tool system.

mod common;

use colloquy::tools::*;
use common::{add_tool, deploy_tool};
use pretty_assertions::assert_eq;

#[test]
fn definitions_follow_registration_order() {
    let registry = ToolRegistry::new()
        .with_tool(deploy_tool())
        .with_tool(add_tool());
    let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["deploy", "add"]);
    assert_eq!(registry.names(), vec!["deploy", "add"]);
    assert_eq!(registry.definitions()[1].parameters["required"][0], "a");
}

#[test]
fn approval_and_policy_flags() {
    let deploy = deploy_tool();
    assert!(deploy.requires_approval());
    assert_eq!(deploy.error_policy(), ToolErrorPolicy::Resilient);
    assert!(!add_tool().requires_approval());
    assert_eq!("fail_fast".parse::<ToolErrorPolicy>().unwrap(), ToolErrorPolicy::FailFast);
}

#[tokio::test]
async fn executor_runs_registered_tool() {
    let registry = ToolRegistry::new().with_tool(add_tool());
    let tool = registry.resolve("add").unwrap();
    let executor = ToolExecutor::default();
    let ctx = ToolExecutionContext::for_call("c1", "add").with_conversation("conv-1");
    let output = executor
        .execute(&ctx, tool.as_ref(), r#"{"a": 20, "b": 22}"#)
        .await
        .unwrap();
    assert_eq!(output, serde_json::json!(42));
}

#[tokio::test]
async fn malformed_json_is_an_argument_error() {
    let tool = add_tool();
    let err = ToolExecutor::default()
        .execute(&ToolExecutionContext::default(), tool.as_ref(), "{not json")
        .await
        .unwrap_err();
    assert!(matches!(err, colloquy::error::ColloquyError::InvalidArgument(_)));
}

#[test]
fn tool_arguments_deserialize() {
    #[derive(serde::Deserialize)]
    struct Pair {
        a: i64,
        b: i64,
    }
    let args = ToolArguments::new(serde_json::json!({"a": 1, "b": 2}));
    let pair: Pair = args.deserialize().unwrap();
    assert_eq!(pair.a + pair.b, 3);
}
