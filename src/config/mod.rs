//! Configuration system (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::agent::ConversationStoreConfig;
use crate::agent_loop::ApprovalPolicy;
use crate::error::ColloquyError;
use crate::tools::ToolErrorPolicy;
use crate::types::GenerationSettings;

/// Default bound on tool rounds per invocation.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

/// Settings for one tool-call loop.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct LoopConfig {
    /// Tool rounds allowed before the loop fails with `MaxToolTurnsExceeded`.
    #[builder(default = DEFAULT_MAX_TOOL_ROUNDS)]
    pub max_tool_rounds: usize,
    #[builder(default)]
    pub approval_policy: ApprovalPolicy,
    /// How long to wait for an approval decision. `None` waits indefinitely.
    pub approval_timeout: Option<Duration>,
    /// Upper bound on a single provider invocation.
    pub provider_timeout: Option<Duration>,
    /// `FailFast` here applies to every tool regardless of its own policy.
    #[builder(default)]
    pub tool_error_policy: ToolErrorPolicy,
    /// Use the provider's streaming entry point.
    #[builder(default)]
    pub streaming: bool,
    /// Run the calls of one round concurrently.
    #[builder(default)]
    pub parallel_tools: bool,
    /// Prepended when the conversation has no system message.
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub settings: GenerationSettings,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColloquyConfig {
    pub loop_config: LoopConfig,
    pub store: ConversationStoreConfig,
}

/// On-disk shape of the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    agent: FileLoopSection,
    #[serde(default)]
    store: FileStoreSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLoopSection {
    max_tool_rounds: Option<usize>,
    approval_policy: Option<ApprovalPolicy>,
    approval_timeout_ms: Option<u64>,
    provider_timeout_ms: Option<u64>,
    tool_error_policy: Option<ToolErrorPolicy>,
    streaming: Option<bool>,
    parallel_tools: Option<bool>,
    system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileStoreSection {
    conversation_dir: Option<PathBuf>,
}

impl ColloquyConfig {
    /// Defaults, then the optional TOML file, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ColloquyError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from environment variables (`COLLOQUY_*`) on top of defaults.
    pub fn from_env() -> Result<Self, ColloquyError> {
        Self::load(None)
    }

    /// Defaults overlaid with a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ColloquyError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ColloquyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overlaid with TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ColloquyError> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Self::default();
        config.apply_file(file);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        let FileLoopSection {
            max_tool_rounds,
            approval_policy,
            approval_timeout_ms,
            provider_timeout_ms,
            tool_error_policy,
            streaming,
            parallel_tools,
            system_prompt,
        } = file.agent;
        let target = &mut self.loop_config;
        if let Some(v) = max_tool_rounds {
            target.max_tool_rounds = v;
        }
        if let Some(v) = approval_policy {
            target.approval_policy = v;
        }
        if let Some(ms) = approval_timeout_ms {
            target.approval_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = provider_timeout_ms {
            target.provider_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = tool_error_policy {
            target.tool_error_policy = v;
        }
        if let Some(v) = streaming {
            target.streaming = v;
        }
        if let Some(v) = parallel_tools {
            target.parallel_tools = v;
        }
        if system_prompt.is_some() {
            target.system_prompt = system_prompt;
        }
        if let Some(dir) = file.store.conversation_dir {
            self.store = ConversationStoreConfig::new(dir);
        }
    }

    /// Overlay `COLLOQUY_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ColloquyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = &mut self.loop_config;
        if let Some(v) = lookup("COLLOQUY_MAX_TOOL_ROUNDS") {
            target.max_tool_rounds = parse_env("COLLOQUY_MAX_TOOL_ROUNDS", &v)?;
        }
        if let Some(v) = lookup("COLLOQUY_APPROVAL_POLICY") {
            target.approval_policy = parse_env("COLLOQUY_APPROVAL_POLICY", &v)?;
        }
        if let Some(v) = lookup("COLLOQUY_APPROVAL_TIMEOUT_MS") {
            let ms: u64 = parse_env("COLLOQUY_APPROVAL_TIMEOUT_MS", &v)?;
            target.approval_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = lookup("COLLOQUY_PROVIDER_TIMEOUT_MS") {
            let ms: u64 = parse_env("COLLOQUY_PROVIDER_TIMEOUT_MS", &v)?;
            target.provider_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = lookup("COLLOQUY_STREAMING") {
            target.streaming = parse_flag("COLLOQUY_STREAMING", &v)?;
        }
        if let Some(v) = lookup("COLLOQUY_PARALLEL_TOOLS") {
            target.parallel_tools = parse_flag("COLLOQUY_PARALLEL_TOOLS", &v)?;
        }
        if let Some(dir) = lookup("COLLOQUY_CONVERSATION_DIR") {
            self.store = ConversationStoreConfig::new(PathBuf::from(dir));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ColloquyError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ColloquyError::Configuration(format!("invalid {key}={value:?}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ColloquyError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ColloquyError::Configuration(format!(
            "invalid {key}={value:?}: expected a boolean"
        ))),
    }
}
