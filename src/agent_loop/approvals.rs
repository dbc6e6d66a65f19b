//! Asynchronous permission approvals for sensitive tool calls.
//!
//! The loop registers a [`PermissionRequest`] with the [`ApprovalManager`],
//! which hands it to an [`Approver`] on a spawned task and returns a
//! [`PendingDecision`]. Whoever decides calls
//! [`ApprovalManager::complete_approval`]; the waiting side then resumes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::ColloquyError;
use crate::types::Metadata;

/// Tool approval policy for a run.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ApprovalPolicy {
    /// Decline every tool that requires approval.
    Never,
    /// Ask the approval manager for tools that require approval.
    #[default]
    Ask,
    /// Run tools that require approval without asking.
    Always,
}

/// Decision state of a permission request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Denied,
    Pending,
}

impl ApprovalStatus {
    /// Only approved and denied decisions resolve a request.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A request to run a sensitive tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRequest {
    pub id: String,
    pub tool_name: String,
    /// Tool arguments as serialized JSON text.
    pub arguments: String,
    /// Requester context (conversation id, tool call id, ...).
    #[serde(default)]
    pub context: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionRequest {
    pub fn new(tool_name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
            context: Metadata::new(),
            reason: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A decision for a [`PermissionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionApproval {
    pub status: ApprovalStatus,
    /// Explanation shown to the model when denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl PermissionApproval {
    pub fn approved() -> Self {
        Self::with_status(ApprovalStatus::Approved)
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            content: Some(reason.into()),
            ..Self::with_status(ApprovalStatus::Denied)
        }
    }

    pub fn pending() -> Self {
        Self::with_status(ApprovalStatus::Pending)
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    fn with_status(status: ApprovalStatus) -> Self {
        Self {
            status,
            content: None,
            metadata: Metadata::new(),
        }
    }
}

/// Decides permission requests.
///
/// Implementations must call [`ApprovalManager::complete_approval`] (or
/// [`ApprovalManager::cancel_approval`]) at most once per request, either
/// before returning or later from elsewhere.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn request_approval(&self, request: PermissionRequest, manager: ApprovalManager);
}

/// Approves every request immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

#[async_trait]
impl Approver for AlwaysApprove {
    async fn request_approval(&self, request: PermissionRequest, manager: ApprovalManager) {
        manager.complete_approval(&request.id, PermissionApproval::approved());
    }
}

/// Denies every request immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

#[async_trait]
impl Approver for AlwaysDeny {
    async fn request_approval(&self, request: PermissionRequest, manager: ApprovalManager) {
        let reason = format!("{} is not permitted", request.tool_name);
        manager.complete_approval(&request.id, PermissionApproval::denied(reason));
    }
}

/// Async approval handler callback.
pub type ApprovalHandler =
    Arc<dyn Fn(PermissionRequest) -> BoxFuture<'static, PermissionApproval> + Send + Sync>;

/// Delegates each decision to an async closure.
#[derive(Clone)]
pub struct HandlerApprover {
    handler: ApprovalHandler,
}

impl HandlerApprover {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(PermissionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PermissionApproval> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |request| Box::pin(handler(request))),
        }
    }
}

#[async_trait]
impl Approver for HandlerApprover {
    async fn request_approval(&self, request: PermissionRequest, manager: ApprovalManager) {
        let id = request.id.clone();
        let approval = (self.handler)(request).await;
        if !manager.complete_approval(&id, approval) {
            tracing::debug!(request_id = %id, "approval handler decision was not applied");
        }
    }
}

/// Forwards requests to an external consumer, which later completes them
/// through the manager.
#[derive(Debug, Clone)]
pub struct ChannelApprover {
    sender: mpsc::UnboundedSender<PermissionRequest>,
}

impl ChannelApprover {
    /// Create the approver and the stream of requests it forwards.
    pub fn channel() -> (Self, UnboundedReceiverStream<PermissionRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, UnboundedReceiverStream::new(receiver))
    }
}

#[async_trait]
impl Approver for ChannelApprover {
    async fn request_approval(&self, request: PermissionRequest, manager: ApprovalManager) {
        let id = request.id.clone();
        if self.sender.send(request).is_err() {
            tracing::warn!(request_id = %id, "approval consumer is gone, cancelling request");
            manager.cancel_approval(&id);
        }
    }
}

enum ApprovalOutcome {
    Decided(PermissionApproval),
    Cancelled,
}

struct ManagerInner {
    pending: Mutex<HashMap<String, oneshot::Sender<ApprovalOutcome>>>,
    closed: AtomicBool,
    approver: Arc<dyn Approver>,
}

/// Brokers asynchronous approve/deny decisions.
///
/// Cheap to clone; clones share the same pending map.
#[derive(Clone)]
pub struct ApprovalManager {
    inner: Arc<ManagerInner>,
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysApprove))
    }
}

impl std::fmt::Debug for ApprovalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalManager")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ApprovalManager {
    pub fn new(approver: Arc<dyn Approver>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                pending: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                approver,
            }),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<ApprovalOutcome>>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `request` and hand it to the approver. Returns immediately.
    ///
    /// On a closed manager the decision resolves as cancelled and the
    /// approver is not consulted. Must be called from within a tokio runtime.
    pub fn initiate_approval(&self, request: PermissionRequest) -> PendingDecision {
        let (sender, receiver) = oneshot::channel();
        let request_id = request.id.clone();
        let decision = PendingDecision {
            request_id: request_id.clone(),
            receiver,
            manager: self.clone(),
        };
        {
            let mut pending = self.pending();
            if self.is_closed() {
                tracing::warn!(request_id = %request_id, "approval manager is closed, cancelling request");
                let _ = sender.send(ApprovalOutcome::Cancelled);
                return decision;
            }
            if let Some(stale) = pending.insert(request_id.clone(), sender) {
                tracing::warn!(request_id = %request_id, "duplicate approval id, cancelling stale request");
                let _ = stale.send(ApprovalOutcome::Cancelled);
            }
        }
        tracing::debug!(request_id = %request_id, tool = %request.tool_name, "approval requested");

        let approver = self.inner.approver.clone();
        let manager = self.clone();
        tokio::spawn(async move {
            approver.request_approval(request, manager).await;
        });

        decision
    }

    /// Resolve a pending request. Unknown ids, already resolved ids and
    /// non-terminal statuses are ignored and return `false`.
    pub fn complete_approval(&self, request_id: &str, approval: PermissionApproval) -> bool {
        if !approval.status.is_terminal() {
            tracing::debug!(request_id, "ignoring non-terminal approval status");
            return false;
        }
        let Some(sender) = self.pending().remove(request_id) else {
            tracing::warn!(request_id, "no pending approval for id");
            return false;
        };
        sender.send(ApprovalOutcome::Decided(approval)).is_ok()
    }

    /// Resolve a pending request as cancelled. Returns `false` when nothing was pending.
    pub fn cancel_approval(&self, request_id: &str) -> bool {
        match self.pending().remove(request_id) {
            Some(sender) => {
                let _ = sender.send(ApprovalOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding request and refuse new ones.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut pending = self.pending();
            self.inner.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "cancelling outstanding approvals");
        }
        for (_, sender) in drained {
            let _ = sender.send(ApprovalOutcome::Cancelled);
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending().contains_key(request_id)
    }

    /// Drop the entry for a waiter that gave up, unless a newer request
    /// reused the id.
    fn forget(&self, request_id: &str) {
        let mut pending = self.pending();
        if pending.get(request_id).is_some_and(|s| s.is_closed()) {
            pending.remove(request_id);
        }
    }
}

/// Handle for a registered request; resolves once a decision arrives.
pub struct PendingDecision {
    request_id: String,
    receiver: oneshot::Receiver<ApprovalOutcome>,
    manager: ApprovalManager,
}

enum WaitEnd {
    Outcome(Option<ApprovalOutcome>),
    Cancelled,
    TimedOut(Duration),
}

impl PendingDecision {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the decision, the caller's cancellation, or `timeout`.
    ///
    /// When the caller gives up, the request is removed from the manager.
    pub async fn wait(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PermissionApproval, ColloquyError> {
        let Self {
            request_id,
            mut receiver,
            manager,
        } = self;

        let deadline = async {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending::<Duration>().await,
            }
        };

        let end = tokio::select! {
            outcome = &mut receiver => WaitEnd::Outcome(outcome.ok()),
            _ = cancel.cancelled() => WaitEnd::Cancelled,
            limit = deadline => WaitEnd::TimedOut(limit),
        };

        match end {
            WaitEnd::Outcome(Some(ApprovalOutcome::Decided(approval))) => Ok(approval),
            WaitEnd::Outcome(_) => Err(ColloquyError::ApprovalCancelled { request_id }),
            WaitEnd::Cancelled => {
                drop(receiver);
                manager.forget(&request_id);
                Err(ColloquyError::ApprovalCancelled { request_id })
            }
            WaitEnd::TimedOut(limit) => {
                drop(receiver);
                manager.forget(&request_id);
                tracing::warn!(request_id = %request_id, "approval timed out");
                Err(ColloquyError::ApprovalTimedOut {
                    request_id,
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl std::fmt::Debug for PendingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDecision")
            .field("request_id", &self.request_id)
            .finish()
    }
}
