//! Provider options forwarded with every model invocation.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

/// Settings forwarded to the model provider on each invocation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub tool_choice: Option<ToolChoice>,
    pub user: Option<String>,
    /// Provider-specific passthrough options.
    #[serde(default)]
    #[builder(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// How the model may use the tool catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

