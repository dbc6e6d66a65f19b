//! Tool system for function calling.

pub mod arguments;
pub mod listener;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use listener::{ListenerPipeline, ListenerResult, ToolListener, ToolStage};
pub use registry::{tool_response, ToolExecutor, ToolRegistry};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{ToolErrorPolicy, ToolParameters};
pub use validation::validate_arguments;
