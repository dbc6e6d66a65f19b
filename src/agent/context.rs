//! Explicitly constructed runtime context.
//!
//! An [`AgentContext`] owns the shared pieces a session needs (tool registry,
//! listener pipeline, approval manager, configuration) and hands out
//! [`ToolCallLoop`]s wired to them. It has an explicit lifecycle: loops can
//! only be created between [`init`](AgentContext::init) and
//! [`shutdown`](AgentContext::shutdown).

use std::sync::Arc;

use strum::Display;
use tokio::sync::watch;

use super::store::FileConversationStore;
use crate::agent_loop::{ApprovalManager, Approver, RunEventSink, ToolCallLoop};
use crate::config::ColloquyConfig;
use crate::error::ColloquyError;
use crate::provider::ModelProvider;
use crate::tools::{ListenerPipeline, ToolExecutor, ToolListener, ToolRegistry};

/// Context lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ContextState {
    Created,
    Running,
    ShutDown,
}

pub struct AgentContext {
    config: ColloquyConfig,
    tools: Arc<ToolRegistry>,
    listeners: Arc<ListenerPipeline>,
    approvals: ApprovalManager,
    event_sink: Option<RunEventSink>,
    state: watch::Sender<ContextState>,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("state", &self.state())
            .field("tools", &self.tools)
            .field("listeners", &self.listeners)
            .field("approvals", &self.approvals)
            .finish()
    }
}

impl AgentContext {
    /// Create a context in the `Created` state. Approvals default to
    /// [`AlwaysApprove`](crate::agent_loop::AlwaysApprove).
    pub fn new(config: ColloquyConfig, tools: ToolRegistry) -> Self {
        let (state, _) = watch::channel(ContextState::Created);
        Self {
            config,
            tools: Arc::new(tools),
            listeners: Arc::new(ListenerPipeline::new()),
            approvals: ApprovalManager::default(),
            event_sink: None,
            state,
        }
    }

    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approvals = ApprovalManager::new(approver);
        self
    }

    /// Sink attached to every loop this context creates.
    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn ToolListener>) {
        self.listeners.register(listener);
    }

    pub fn config(&self) -> &ColloquyConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn listeners(&self) -> &Arc<ListenerPipeline> {
        &self.listeners
    }

    pub fn approvals(&self) -> &ApprovalManager {
        &self.approvals
    }

    pub fn state(&self) -> ContextState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ContextState> {
        self.state.subscribe()
    }

    /// Move to `Running`. Calling it again while running is a no-op; a
    /// context that was shut down cannot be restarted.
    pub fn init(&self) -> Result<(), ColloquyError> {
        match self.state() {
            ContextState::Running => Ok(()),
            ContextState::ShutDown => Err(ColloquyError::InvalidState(
                "agent context was shut down".into(),
            )),
            ContextState::Created => {
                self.state.send_replace(ContextState::Running);
                tracing::debug!(tools = self.tools.len(), "agent context initialized");
                Ok(())
            }
        }
    }

    /// Cancel outstanding approvals and refuse further loops.
    pub fn shutdown(&self) {
        if self.state() == ContextState::ShutDown {
            return;
        }
        self.approvals.close();
        self.state.send_replace(ContextState::ShutDown);
        tracing::debug!("agent context shut down");
    }

    /// Build a loop wired to this context's registry, listeners and approvals.
    pub fn tool_loop(&self, provider: Arc<dyn ModelProvider>) -> Result<ToolCallLoop, ColloquyError> {
        self.ensure_running()?;
        let mut tool_loop = ToolCallLoop::new(provider, self.tools.clone())
            .with_config(self.config.loop_config.clone())
            .with_executor(ToolExecutor::new(self.listeners.clone()))
            .with_approvals(self.approvals.clone());
        if let Some(sink) = &self.event_sink {
            tool_loop = tool_loop.with_event_sink(sink.clone());
        }
        Ok(tool_loop)
    }

    /// File store rooted at the configured conversation directory.
    pub fn file_store(&self) -> FileConversationStore {
        FileConversationStore::new(self.config.store.clone())
    }

    fn ensure_running(&self) -> Result<(), ColloquyError> {
        match self.state() {
            ContextState::Running => Ok(()),
            state => Err(ColloquyError::InvalidState(format!(
                "agent context is {state}, expected running"
            ))),
        }
    }
}
