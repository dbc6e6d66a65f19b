//! Tool-call loop, run events and permission approvals.

pub mod approvals;
pub mod events;
pub mod runner;

pub use approvals::*;
pub use events::{RunEvent, RunEventPayload, RunEventSink, RunEventStream, RunId, RunLifecycle};
pub use runner::ToolCallLoop;
