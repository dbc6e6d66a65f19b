//! A single turn of a conversation.

use serde::{Deserialize, Serialize};

use crate::types::Message;

/// An ordered run of messages forming one logical exchange.
///
/// Turns only change through [`Conversation`](super::Conversation), which
/// guarantees a finished turn is never appended to again.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageTurn {
    messages: Vec<Message>,
    finished: bool,
}

impl MessageTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the turn holds anything besides system messages.
    pub fn counts_as_turn(&self) -> bool {
        self.messages.iter().any(|m| !m.is_system())
    }

    pub(crate) fn from_parts(messages: Vec<Message>, finished: bool) -> Self {
        Self { messages, finished }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    pub(crate) fn reopen(&mut self) {
        self.finished = false;
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}
