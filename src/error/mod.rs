//! Error types for Colloquy.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Colloquy operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool rejected: {tool_name}: {reason}")]
    ToolRejected { tool_name: String, reason: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool loop exceeded {limit} tool rounds")]
    MaxToolTurnsExceeded { limit: usize },

    #[error("Approval cancelled: {request_id}")]
    ApprovalCancelled { request_id: String },

    #[error("Approval timed out after {timeout_ms}ms: {request_id}")]
    ApprovalTimedOut { request_id: String, timeout_ms: u64 },

    #[error("Message conversion error: {0}")]
    MessageConversion(String),

    #[error("Conversation target not found: {0}")]
    ConversationTargetNotFound(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ColloquyError {
    /// Create a tool execution error.
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Serialization(_) | Self::MessageConversion(_) => ErrorCategory::Serialization,
            Self::ToolNotFound(_) | Self::ToolRejected { .. } | Self::ToolExecution { .. } => {
                ErrorCategory::ToolExecution
            }
            Self::ApprovalCancelled { .. } | Self::ApprovalTimedOut { .. } => {
                ErrorCategory::Approval
            }
            Self::MaxToolTurnsExceeded { .. } => ErrorCategory::LoopLimit,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Canceled => ErrorCategory::Canceled,
            Self::ConversationTargetNotFound(_)
            | Self::UnsupportedOperation(_)
            | Self::InvalidArgument(_)
            | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Provider | ErrorCategory::Timeout | ErrorCategory::Storage
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Provider | ErrorCategory::Storage => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::LoopLimit => RecoverySuggestion::RaiseRoundLimit,
            ErrorCategory::Approval => RecoverySuggestion::ResubmitForApproval,
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
