//! Turn-structured conversation history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::turn::MessageTurn;
use crate::error::ColloquyError;
use crate::types::Message;

/// Ordered, turn-structured message log for one session.
///
/// Only the last turn may be unfinished. Messages are appended in order and
/// never modified; the log shrinks only through [`reset_after`](Self::reset_after)
/// and [`clear`](Self::clear).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    id: String,
    turns: Vec<MessageTurn>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create an empty conversation with a generated id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
        }
    }

    pub(crate) fn from_turns(id: impl Into<String>, turns: Vec<MessageTurn>) -> Self {
        Self {
            id: id.into(),
            turns,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[MessageTurn] {
        &self.turns
    }

    /// Number of turns holding at least one non-system message.
    pub fn turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.counts_as_turn()).count()
    }

    /// Append to the open turn, starting a new one if the last turn is
    /// missing or finished.
    pub fn append_message(&mut self, message: Message) {
        match self.turns.last_mut() {
            Some(turn) if !turn.is_finished() => turn.push(message),
            _ => {
                let mut turn = MessageTurn::new();
                turn.push(message);
                self.turns.push(turn);
            }
        }
    }

    /// Finish the current turn and open a fresh, empty one.
    ///
    /// If the newest turn is already open and empty it is returned as is.
    pub fn new_turn(&mut self) -> &MessageTurn {
        let reuse = matches!(self.turns.last(), Some(t) if t.is_empty() && !t.is_finished());
        if !reuse {
            if let Some(last) = self.turns.last_mut() {
                last.finish();
            }
            self.turns.push(MessageTurn::new());
        }
        let index = self.turns.len() - 1;
        &self.turns[index]
    }

    /// Mark the last turn finished. Empty turns are dropped instead.
    pub fn finish_turn(&mut self) {
        match self.turns.last_mut() {
            Some(turn) if turn.is_empty() => {
                self.turns.pop();
            }
            Some(turn) => turn.finish(),
            None => {}
        }
    }

    /// All messages in chronological order.
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.turns.iter().flat_map(|turn| turn.messages().iter())
    }

    /// All messages, most recent first.
    pub fn messages_rev(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages().rev()
    }

    /// Owned chronological copy of the log.
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.iter().map(MessageTurn::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.iter().all(MessageTurn::is_empty)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages_rev().next()
    }

    /// The `n` most recent messages in chronological order.
    pub fn last_messages(&self, n: usize) -> Vec<&Message> {
        let mut recent: Vec<&Message> = self.messages_rev().take(n).collect();
        recent.reverse();
        recent
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages().find(|m| m.id == id)
    }

    /// Every message matching `predicate`, scanning newest-first when `reverse`.
    pub fn find_messages<P>(&self, predicate: P, reverse: bool) -> Vec<&Message>
    where
        P: Fn(&Message) -> bool,
    {
        if reverse {
            self.messages_rev().filter(|m| predicate(m)).collect()
        } else {
            self.messages().filter(|m| predicate(m)).collect()
        }
    }

    /// First message matching `predicate` in the requested direction.
    pub fn find_message<P>(&self, predicate: P, reverse: bool) -> Option<&Message>
    where
        P: Fn(&Message) -> bool,
    {
        if reverse {
            self.messages_rev().find(|m| predicate(m))
        } else {
            self.messages().find(|m| predicate(m))
        }
    }

    /// Drop every message appended after `target_id`, and the target itself
    /// when `inclusive`. Returns the number of removed messages.
    ///
    /// The turn holding the new last message is reopened so the next append
    /// continues it. Unknown ids leave the conversation untouched.
    pub fn reset_after(&mut self, target_id: &str, inclusive: bool) -> Result<usize, ColloquyError> {
        let (turn_index, message_index) = self
            .position(target_id)
            .ok_or_else(|| ColloquyError::ConversationTargetNotFound(target_id.to_string()))?;

        let before = self.len();
        let keep = if inclusive {
            message_index
        } else {
            message_index + 1
        };
        self.turns.truncate(turn_index + 1);
        if let Some(turn) = self.turns.last_mut() {
            turn.truncate(keep);
            if turn.is_empty() {
                self.turns.pop();
            }
        }
        if let Some(turn) = self.turns.last_mut() {
            turn.reopen();
        }

        let removed = before - self.len();
        tracing::debug!(
            conversation_id = %self.id,
            target_id,
            inclusive,
            removed,
            "conversation reset"
        );
        Ok(removed)
    }

    /// Remove all turns. The id is kept.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn position(&self, id: &str) -> Option<(usize, usize)> {
        self.turns.iter().enumerate().find_map(|(turn_index, turn)| {
            turn.messages()
                .iter()
                .position(|m| m.id == id)
                .map(|message_index| (turn_index, message_index))
        })
    }
}
