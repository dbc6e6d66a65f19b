//! Tool-related types: parameter schemas and failure policy.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// JSON Schema describing a tool's input. Schemas are supplied by the tool
/// author; nothing here generates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    pub schema: serde_json::Value,
}

impl ToolParameters {
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// An object schema without properties.
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }
}

/// What the tool-call loop does when resolving or running a tool fails.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolErrorPolicy {
    /// Report the failure to the model as an error tool response and keep going.
    #[default]
    Resilient,
    /// Abort the whole loop with the error.
    FailFast,
}
