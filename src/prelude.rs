//! Convenience re-exports for common use.

pub use crate::agent::{
    AgentContext, AgentSession, Conversation, ConversationStore, FileConversationStore,
    InMemoryConversationStore,
};
pub use crate::agent_loop::{
    ApprovalManager, ApprovalPolicy, ApprovalStatus, PermissionApproval, PermissionRequest,
    RunEvent, RunEventPayload, ToolCallLoop,
};
pub use crate::config::{ColloquyConfig, LoopConfig};
pub use crate::error::{ColloquyError, Result};
pub use crate::provider::{ModelProvider, ModelResult, ProviderRequest};
pub use crate::tools::{AgentTool, Tool, ToolArguments, ToolListener, ToolParameters, ToolRegistry};
pub use crate::types::{GenerationSettings, Message, MessageKind, ToolCall, ToolResponse};
pub use tokio_util::sync::CancellationToken;
