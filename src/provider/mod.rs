//! Model provider boundary.
//!
//! The network call itself lives outside this crate; the tool-call loop only
//! needs something that turns a message history into the next message.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ColloquyError;
use crate::types::{roles, GenerationSettings, Message, MessageBody, Metadata};

/// A request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What the model produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResult {
    /// A final answer; the loop ends.
    Final(Message),
    /// An assistant message requesting tool calls.
    ToolCalls(Message),
}

impl ModelResult {
    /// Classify a single message by whether it carries tool calls.
    pub fn from_message(message: Message) -> Self {
        if message.has_tool_calls() {
            Self::ToolCalls(message)
        } else {
            Self::Final(message)
        }
    }

    /// Derive the result of a streamed invocation from its aggregated messages.
    ///
    /// A single message is classified as is. Several messages are folded into
    /// one so no completed text is lost: if any of them requests tools, the
    /// result is a tool-call message carrying every call plus the text and
    /// media of the others, in stream order; otherwise the texts are joined
    /// into the last message.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, ColloquyError> {
        if messages.len() <= 1 {
            return messages
                .into_iter()
                .next()
                .map(Self::from_message)
                .ok_or_else(|| {
                    ColloquyError::InvalidState("provider stream produced no messages".into())
                });
        }

        let anchor = messages
            .iter()
            .position(Message::has_tool_calls)
            .unwrap_or(messages.len() - 1);
        let mut content = String::new();
        let mut media = Vec::new();
        let mut tool_calls = Vec::new();
        let mut metadata = Metadata::new();
        for message in &messages {
            match &message.body {
                MessageBody::Role {
                    content: text,
                    media: items,
                    ..
                } => {
                    content.push_str(text);
                    media.extend(items.iter().cloned());
                }
                MessageBody::ToolCall {
                    content: text,
                    media: items,
                    tool_calls: calls,
                } => {
                    content.push_str(text);
                    media.extend(items.iter().cloned());
                    tool_calls.extend(calls.iter().cloned());
                }
                MessageBody::System { .. } | MessageBody::ToolResponse { .. } => {
                    tracing::debug!(kind = %message.kind(), "ignoring streamed message kind");
                    continue;
                }
            }
            metadata.extend(message.metadata.clone());
        }

        let mut folded = messages
            .into_iter()
            .nth(anchor)
            .ok_or_else(|| ColloquyError::InvalidState("provider stream produced no messages".into()))?;
        folded.body = match folded.body {
            MessageBody::Role { role, .. } if tool_calls.is_empty() => MessageBody::Role {
                role,
                content,
                media,
            },
            _ if tool_calls.is_empty() => MessageBody::Role {
                role: roles::ASSISTANT.to_string(),
                content,
                media,
            },
            _ => MessageBody::ToolCall {
                content,
                media,
                tool_calls,
            },
        };
        folded.metadata = metadata;
        Ok(Self::from_message(folded))
    }

    pub fn message(&self) -> &Message {
        match self {
            Self::Final(m) | Self::ToolCalls(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Self::Final(m) | Self::ToolCalls(m) => m,
        }
    }
}

/// Core trait implemented by model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "scripted").
    fn provider_name(&self) -> &str;

    /// Produce the next message for the given history (non-streaming).
    async fn invoke(&self, request: &ProviderRequest) -> Result<ModelResult, ColloquyError>;

    /// Produce the next message as a stream of deltas.
    async fn stream(
        &self,
        _request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<Message, ColloquyError>>, ColloquyError> {
        Err(ColloquyError::UnsupportedOperation(format!(
            "{} does not support streaming",
            self.provider_name()
        )))
    }
}
