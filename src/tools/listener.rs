//! Tool execution listeners.
//!
//! Listeners observe every tool execution in registration order. A listener
//! that returns an error or panics is logged and skipped; it never stops the
//! remaining listeners nor the tool itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use strum::Display;

use super::arguments::ToolArguments;
use super::tool::ToolExecutionContext;
use crate::error::ColloquyError;
use crate::types::ToolResponse;

/// Result returned by listener callbacks.
pub type ListenerResult = Result<(), ColloquyError>;

/// Observer of tool execution lifecycle events. Every callback defaults to a no-op.
pub trait ToolListener: Send + Sync {
    /// Name used when reporting failures of this listener.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Raw JSON input received for the call, before parsing.
    fn on_tool_input_request(&self, _ctx: &ToolExecutionContext, _raw_input: &str) -> ListenerResult {
        Ok(())
    }

    /// Parsed and validated arguments, right before the tool runs.
    fn on_tool_input(&self, _ctx: &ToolExecutionContext, _args: &ToolArguments) -> ListenerResult {
        Ok(())
    }

    fn on_tool_output(&self, _ctx: &ToolExecutionContext, _output: &serde_json::Value) -> ListenerResult {
        Ok(())
    }

    fn on_tool_exception(&self, _ctx: &ToolExecutionContext, _error: &ColloquyError) -> ListenerResult {
        Ok(())
    }

    /// The response that will be reported back to the model.
    fn on_tool_response(&self, _ctx: &ToolExecutionContext, _response: &ToolResponse) -> ListenerResult {
        Ok(())
    }
}

/// Lifecycle stage a listener was notified for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToolStage {
    InputRequest,
    Input,
    Output,
    Exception,
    Response,
}

/// Ordered set of listeners with failure isolation.
#[derive(Default)]
pub struct ListenerPipeline {
    listeners: RwLock<Vec<Arc<dyn ToolListener>>>,
    failures: AtomicU64,
}

impl ListenerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ToolListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of listener callbacks that failed so far.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Invoke `callback` on every listener in registration order.
    ///
    /// This is the only place listeners are called from.
    pub fn notify<F>(&self, stage: ToolStage, ctx: &ToolExecutionContext, callback: F)
    where
        F: Fn(&dyn ToolListener) -> ListenerResult,
    {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(listener.as_ref())));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                listener = listener.name(),
                %stage,
                tool = ctx.tool_name.as_deref().unwrap_or_default(),
                tool_call_id = ctx.tool_call_id.as_deref().unwrap_or_default(),
                error = %failure,
                "tool listener failed"
            );
        }
    }
}

impl std::fmt::Debug for ListenerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerPipeline")
            .field("listeners", &self.len())
            .field("failures", &self.failure_count())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = panic.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".to_string()
    }
}
