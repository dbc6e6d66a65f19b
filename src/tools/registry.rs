//! Tool lookup and execution.

use std::sync::Arc;

use super::arguments::ToolArguments;
use super::listener::{ListenerPipeline, ToolListener, ToolStage};
use super::tool::{Tool, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::error::ColloquyError;
use crate::provider::ToolDefinition;
use crate::types::ToolResponse;

/// Named tools available to a session, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => {
                tracing::warn!(tool = tool.name(), "replacing registered tool");
                *existing = tool;
            }
            None => self.tools.push(tool),
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ColloquyError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| ColloquyError::ToolNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Catalog sent to the model provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Runs tools and drives the listener pipeline around each execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    listeners: Arc<ListenerPipeline>,
}

impl ToolExecutor {
    pub fn new(listeners: Arc<ListenerPipeline>) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &Arc<ListenerPipeline> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn ToolListener>) {
        self.listeners.register(listener);
    }

    /// Execute `tool` with the raw JSON the model produced.
    ///
    /// Listeners see `input_request`, `input`, then `output` or `exception`,
    /// then `response`. Errors other than [`ColloquyError::InvalidArgument`]
    /// are reported as [`ColloquyError::ToolExecution`].
    pub async fn execute(
        &self,
        ctx: &ToolExecutionContext,
        tool: &dyn Tool,
        json_input: &str,
    ) -> Result<serde_json::Value, ColloquyError> {
        self.listeners.notify(ToolStage::InputRequest, ctx, |l| {
            l.on_tool_input_request(ctx, json_input)
        });

        let result = match self.prepare(tool, json_input) {
            Ok(args) => {
                self.listeners
                    .notify(ToolStage::Input, ctx, |l| l.on_tool_input(ctx, &args));
                tool.execute(&args, ctx).await.map_err(|err| match err {
                    err @ (ColloquyError::ToolExecution { .. }
                    | ColloquyError::InvalidArgument(_)) => err,
                    other => ColloquyError::tool_execution(tool.name(), other.to_string()),
                })
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(output) => self
                .listeners
                .notify(ToolStage::Output, ctx, |l| l.on_tool_output(ctx, output)),
            Err(err) => self
                .listeners
                .notify(ToolStage::Exception, ctx, |l| l.on_tool_exception(ctx, err)),
        }

        let response = tool_response(ctx, tool.name(), &result);
        self.listeners
            .notify(ToolStage::Response, ctx, |l| l.on_tool_response(ctx, &response));
        result
    }

    /// Close the listener sequence of an execution abandoned by cancellation:
    /// `exception` with [`ColloquyError::Canceled`], then `response`.
    pub fn notify_canceled(&self, ctx: &ToolExecutionContext, tool_name: &str) {
        let err = ColloquyError::Canceled;
        self.listeners
            .notify(ToolStage::Exception, ctx, |l| l.on_tool_exception(ctx, &err));
        let response = tool_response(ctx, tool_name, &Err(err));
        self.listeners
            .notify(ToolStage::Response, ctx, |l| l.on_tool_response(ctx, &response));
    }

    fn prepare(&self, tool: &dyn Tool, json_input: &str) -> Result<ToolArguments, ColloquyError> {
        let args = ToolArguments::parse(json_input)?;
        validate_arguments(args.raw(), tool.parameters())?;
        Ok(args)
    }
}

/// Build the response reported to the model for an execution result.
pub fn tool_response(
    ctx: &ToolExecutionContext,
    tool_name: &str,
    result: &Result<serde_json::Value, ColloquyError>,
) -> ToolResponse {
    let call_id = ctx.tool_call_id.clone().unwrap_or_default();
    match result {
        Ok(value) => ToolResponse::success(call_id, tool_name, value),
        Err(err) => ToolResponse::error(call_id, tool_name, err.to_string()),
    }
}
