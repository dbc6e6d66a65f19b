//! A conversation bound to a tool-call loop and a store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::context::AgentContext;
use super::conversation::Conversation;
use super::store::ConversationStore;
use crate::agent_loop::ToolCallLoop;
use crate::error::ColloquyError;
use crate::provider::ModelProvider;
use crate::types::Message;

/// One persisted conversation driven by a [`ToolCallLoop`].
///
/// Every exchange is saved after the loop returns, including failed ones,
/// so the stored copy always matches what the loop appended.
pub struct AgentSession {
    conversation: Conversation,
    tool_loop: ToolCallLoop,
    store: Arc<dyn ConversationStore>,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("conversation_id", &self.conversation.id())
            .field("messages", &self.conversation.len())
            .finish()
    }
}

impl AgentSession {
    pub fn new(
        conversation: Conversation,
        tool_loop: ToolCallLoop,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            conversation,
            tool_loop,
            store,
        }
    }

    /// Open (or start) the conversation `conversation_id`, restoring any stored copy.
    pub fn open(
        context: &AgentContext,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ConversationStore>,
        conversation_id: impl Into<String>,
    ) -> Result<Self, ColloquyError> {
        let tool_loop = context.tool_loop(provider)?;
        let mut conversation = Conversation::with_id(conversation_id);
        if store.load(&mut conversation)? {
            tracing::debug!(
                conversation_id = conversation.id(),
                messages = conversation.len(),
                "restored conversation"
            );
        }
        Ok(Self::new(conversation, tool_loop, store))
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn id(&self) -> &str {
        self.conversation.id()
    }

    /// Send user text and return the model's final answer.
    pub async fn send(
        &mut self,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Message, ColloquyError> {
        self.send_messages(vec![Message::user(text)], cancel).await
    }

    pub async fn send_messages(
        &mut self,
        input: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Message, ColloquyError> {
        let result = self.tool_loop.run(&mut self.conversation, input, cancel).await;
        let saved = self.save();
        let answer = result?;
        saved?;
        Ok(answer)
    }

    pub fn save(&self) -> Result<(), ColloquyError> {
        self.store.save(&self.conversation)
    }

    /// Replace the in-memory conversation with the stored copy, if any.
    pub fn reload(&mut self) -> Result<bool, ColloquyError> {
        self.store.load(&mut self.conversation)
    }

    /// Rewind to `message_id` and persist the result.
    pub fn reset_after(&mut self, message_id: &str, inclusive: bool) -> Result<usize, ColloquyError> {
        let removed = self.conversation.reset_after(message_id, inclusive)?;
        self.save()?;
        Ok(removed)
    }

    /// Drop every message, in memory and in the store.
    pub fn clear(&mut self) -> Result<(), ColloquyError> {
        self.conversation.clear();
        self.store.clear(self.conversation.id())
    }
}
