//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Serialization,
    ToolExecution,
    Approval,
    LoopLimit,
    Provider,
    Timeout,
    Canceled,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolImplementation,
    RaiseRoundLimit,
    ResubmitForApproval,
    None,
}
