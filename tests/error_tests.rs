//! Tests for error classification.

use colloquy::error::{ColloquyError, ErrorCategory, RecoverySuggestion};
use pretty_assertions::assert_eq;

#[test]
fn loop_limit_is_not_retryable() {
    let err = ColloquyError::MaxToolTurnsExceeded { limit: 20 };
    assert_eq!(err.category(), ErrorCategory::LoopLimit);
    assert!(!err.is_retryable());
    assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RaiseRoundLimit);
}

#[test]
fn approval_errors_share_a_category() {
    let cancelled = ColloquyError::ApprovalCancelled { request_id: "r1".into() };
    let timed_out = ColloquyError::ApprovalTimedOut { request_id: "r1".into(), timeout_ms: 5 };
    assert_eq!(cancelled.category(), ErrorCategory::Approval);
    assert_eq!(timed_out.category(), ErrorCategory::Approval);
    assert_eq!(timed_out.to_string(), "Approval timed out after 5ms: r1");
}

#[test]
fn io_errors_convert() {
    let err: ColloquyError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert_eq!(err.category(), ErrorCategory::Storage);
    assert!(err.is_retryable());
}
