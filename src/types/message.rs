//! Message types exchanged between the caller, the model and tools.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::ColloquyError;

/// Well-known role names. Roles are free-form; these are the ones the runtime emits.
pub mod roles {
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
    pub const SYSTEM: &str = "system";
    pub const TOOL: &str = "tool";
}

/// String-keyed message metadata.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A single message in a conversation.
///
/// The variant payload lives in [`MessageBody`]; identity, metadata and the
/// creation timestamp are shared by every variant. Serialized messages carry a
/// `type` discriminator next to the common fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Variant payload of a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// Ordinary user/assistant text.
    Role {
        role: String,
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<Media>,
    },
    /// Instruction context.
    System { content: String },
    /// Assistant message requesting tool invocations.
    ToolCall {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<Media>,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    /// Results of previously requested tool calls.
    ToolResponse {
        #[serde(default)]
        tool_responses: Vec<ToolResponse>,
    },
}

/// Discriminator for [`MessageBody`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Role,
    System,
    ToolCall,
    ToolResponse,
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Role { .. } => MessageKind::Role,
            MessageBody::System { .. } => MessageKind::System,
            MessageBody::ToolCall { .. } => MessageKind::ToolCall,
            MessageBody::ToolResponse { .. } => MessageKind::ToolResponse,
        }
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    /// Wrap a body with a fresh id and timestamp.
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: new_message_id(),
            body,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a text message with an arbitrary role.
    pub fn with_role(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageBody::Role {
            role: role.into(),
            content: text.into(),
            media: Vec::new(),
        })
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(roles::USER, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(roles::ASSISTANT, text)
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageBody::System {
            content: text.into(),
        })
    }

    /// Create an assistant message that requests tool calls.
    pub fn tool_call(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::new(MessageBody::ToolCall {
            content: content.into(),
            media: Vec::new(),
            tool_calls,
        })
    }

    /// Create a tool response message.
    pub fn tool_response(tool_responses: Vec<ToolResponse>) -> Self {
        Self::new(MessageBody::ToolResponse { tool_responses })
    }

    /// Builder: replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder: insert one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builder: attach a media resource. System and tool-response messages
    /// carry no media, so the resource is dropped for them.
    pub fn with_media(mut self, item: Media) -> Self {
        match &mut self.body {
            MessageBody::Role { media, .. } | MessageBody::ToolCall { media, .. } => {
                media.push(item)
            }
            MessageBody::System { .. } | MessageBody::ToolResponse { .. } => {}
        }
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Speaker role of the message.
    pub fn role(&self) -> &str {
        match &self.body {
            MessageBody::Role { role, .. } => role,
            MessageBody::System { .. } => roles::SYSTEM,
            MessageBody::ToolCall { .. } => roles::ASSISTANT,
            MessageBody::ToolResponse { .. } => roles::TOOL,
        }
    }

    /// Text content (empty for tool responses).
    pub fn content(&self) -> &str {
        match &self.body {
            MessageBody::Role { content, .. }
            | MessageBody::System { content }
            | MessageBody::ToolCall { content, .. } => content,
            MessageBody::ToolResponse { .. } => "",
        }
    }

    pub fn media(&self) -> &[Media] {
        match &self.body {
            MessageBody::Role { media, .. } | MessageBody::ToolCall { media, .. } => media,
            MessageBody::System { .. } | MessageBody::ToolResponse { .. } => &[],
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.body {
            MessageBody::ToolCall { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn tool_responses(&self) -> &[ToolResponse] {
        match &self.body {
            MessageBody::ToolResponse { tool_responses } => tool_responses,
            _ => &[],
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self.body, MessageBody::System { .. })
    }

    /// Whether this message asks for at least one tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw arguments. Blank input is treated as an empty object.
    pub fn arguments_value(&self) -> Result<serde_json::Value, ColloquyError> {
        parse_arguments(&self.arguments)
    }
}

/// Parse raw tool-call JSON. Blank input is treated as an empty object.
pub fn parse_arguments(raw: &str) -> Result<serde_json::Value, ColloquyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(trimmed).map_err(|err| {
        ColloquyError::InvalidArgument(format!("tool arguments are not valid JSON: {err}"))
    })
}

/// The result of a tool call, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    /// JSON-encoded response payload.
    pub response_data: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResponse {
    /// A successful response carrying `value`.
    pub fn success(id: impl Into<String>, name: impl Into<String>, value: &serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response_data: value.to_string(),
            is_error: false,
        }
    }

    /// An error response with an `{"error": ...}` payload.
    pub fn error(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response_data: serde_json::json!({ "error": error.into() }).to_string(),
            is_error: true,
        }
    }

    /// Parse the payload back into JSON.
    pub fn response_value(&self) -> Result<serde_json::Value, ColloquyError> {
        Ok(serde_json::from_str(&self.response_data)?)
    }
}

/// A binary or URI resource attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub mime_type: String,
    pub source: MediaSource,
}

/// Where the bytes of a [`Media`] live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Uri { uri: String },
    /// Standard base64 payload.
    Data { data: String },
}

impl Media {
    pub fn uri(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: MediaSource::Uri { uri: uri.into() },
        }
    }

    /// Inline raw bytes, base64-encoded.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: MediaSource::Data {
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }

    /// Decode inline data. Returns `None` for URI resources.
    pub fn bytes(&self) -> Result<Option<Vec<u8>>, ColloquyError> {
        match &self.source {
            MediaSource::Uri { .. } => Ok(None),
            MediaSource::Data { data } => base64::engine::general_purpose::STANDARD
                .decode(data)
                .map(Some)
                .map_err(|err| {
                    ColloquyError::MessageConversion(format!("invalid base64 media: {err}"))
                }),
        }
    }
}
