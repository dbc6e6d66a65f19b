//! Conversation persistence.
//!
//! Conversations are stored as a JSON array of messages in chronological
//! order (oldest first). Each record carries the index of the turn it belongs
//! to and whether that turn was finished, so turn boundaries survive a round
//! trip. Records without turn annotations (hand-written or foreign files) load
//! into a single open turn.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::conversation::Conversation;
use super::turn::MessageTurn;
use crate::error::ColloquyError;
use crate::types::Message;

/// Storage abstraction for conversations keyed by conversation id.
pub trait ConversationStore: Send + Sync {
    /// Persist the whole conversation, replacing any previous copy.
    fn save(&self, conversation: &Conversation) -> Result<(), ColloquyError>;

    /// Replace the contents of `conversation` with the stored copy for its id.
    ///
    /// Returns `false` (leaving `conversation` untouched) when nothing is stored.
    fn load(&self, conversation: &mut Conversation) -> Result<bool, ColloquyError>;

    /// Delete the stored copy. Missing entries are not an error.
    fn clear(&self, id: &str) -> Result<(), ColloquyError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    turn: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    turn_finished: Option<bool>,
    #[serde(flatten)]
    message: Message,
}

fn encode(conversation: &Conversation) -> Vec<StoredMessage> {
    conversation
        .turns()
        .iter()
        .filter(|turn| !turn.is_empty())
        .enumerate()
        .flat_map(|(index, turn)| {
            turn.messages().iter().map(move |message| StoredMessage {
                turn: Some(index),
                turn_finished: Some(turn.is_finished()),
                message: message.clone(),
            })
        })
        .collect()
}

fn decode(id: &str, records: Vec<StoredMessage>) -> Conversation {
    if records.iter().any(|r| r.turn.is_none()) {
        if !records.is_empty() {
            tracing::debug!(
                conversation_id = id,
                "stored conversation has no turn metadata; loading as one turn"
            );
        }
        let messages: Vec<Message> = records.into_iter().map(|r| r.message).collect();
        let turns = if messages.is_empty() {
            Vec::new()
        } else {
            vec![MessageTurn::from_parts(messages, false)]
        };
        return Conversation::from_turns(id, turns);
    }

    let mut turns: Vec<MessageTurn> = Vec::new();
    let mut current: Option<(usize, Vec<Message>, bool)> = None;
    for record in records {
        let index = record.turn.unwrap_or_default();
        let finished = record.turn_finished.unwrap_or(false);
        match current.as_mut() {
            Some((open_index, messages, open_finished)) if *open_index == index => {
                messages.push(record.message);
                *open_finished = finished;
            }
            _ => {
                if let Some((_, messages, done)) = current.take() {
                    turns.push(MessageTurn::from_parts(messages, done));
                }
                current = Some((index, vec![record.message], finished));
            }
        }
    }
    if let Some((_, messages, done)) = current {
        turns.push(MessageTurn::from_parts(messages, done));
    }

    // Every turn but the last is closed by definition.
    let count = turns.len();
    for turn in turns.iter_mut().take(count.saturating_sub(1)) {
        turn.finish();
    }
    Conversation::from_turns(id, turns)
}

/// Configuration for file-backed conversation storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStoreConfig {
    pub base_dir: PathBuf,
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self::new(default_conversation_dir())
    }
}

impl ConversationStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_conversation_dir()
    }
}

/// File-backed store: one JSON file per conversation id.
///
/// # Example
/// ```no_run
/// use colloquy::agent::{Conversation, ConversationStore, FileConversationStore};
/// use colloquy::types::Message;
///
/// let store = FileConversationStore::new_default();
/// let mut conversation = Conversation::with_id("support-42");
/// conversation.append_message(Message::user("hello"));
/// store.save(&conversation)?;
/// # Ok::<(), colloquy::error::ColloquyError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    base_dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(config: ConversationStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_conversation_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", file_label(id)))
    }

    fn ensure_parent(path: &Path) -> Result<(), ColloquyError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl ConversationStore for FileConversationStore {
    fn save(&self, conversation: &Conversation) -> Result<(), ColloquyError> {
        let path = self.conversation_path(conversation.id());
        Self::ensure_parent(&path)?;
        let serialized = serde_json::to_string_pretty(&encode(conversation))?;
        fs::write(&path, serialized)?;
        tracing::debug!(
            conversation_id = conversation.id(),
            path = %path.display(),
            messages = conversation.len(),
            "conversation saved"
        );
        Ok(())
    }

    fn load(&self, conversation: &mut Conversation) -> Result<bool, ColloquyError> {
        let path = self.conversation_path(conversation.id());
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        let records: Vec<StoredMessage> = serde_json::from_str(&raw).map_err(|err| {
            tracing::warn!(path = %path.display(), error = %err, "corrupt conversation file");
            ColloquyError::MessageConversion(format!("{}: {err}", path.display()))
        })?;
        *conversation = decode(conversation.id(), records);
        Ok(true)
    }

    fn clear(&self, id: &str) -> Result<(), ColloquyError> {
        let path = self.conversation_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local store, mostly for tests and ephemeral sessions.
///
/// Conversations are kept serialized so loads never alias live state.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn save(&self, conversation: &Conversation) -> Result<(), ColloquyError> {
        let serialized = serde_json::to_string(&encode(conversation))?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation.id().to_string(), serialized);
        Ok(())
    }

    fn load(&self, conversation: &mut Conversation) -> Result<bool, ColloquyError> {
        let raw = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(conversation.id()) {
                Some(raw) => raw.clone(),
                None => return Ok(false),
            }
        };
        let records: Vec<StoredMessage> = serde_json::from_str(&raw)?;
        *conversation = decode(conversation.id(), records);
        Ok(true)
    }

    fn clear(&self, id: &str) -> Result<(), ColloquyError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}

fn default_conversation_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".colloquy").join("conversations"))
        .unwrap_or_else(|| PathBuf::from(".colloquy").join("conversations"))
}

/// Map a conversation id onto a file stem, injectively.
///
/// Ids made only of ASCII alphanumerics, `-` and `_` are used as is. Any other
/// id gets a sanitized stem plus `~` and a digest of the raw id; `~` never
/// appears in a plain stem, so the two forms cannot collide.
fn file_label(id: &str) -> String {
    if !id.is_empty() && id.chars().all(is_stem_char) {
        return id.to_string();
    }
    let stem: String = id
        .chars()
        .map(|ch| if is_stem_char(ch) { ch } else { '-' })
        .collect();
    let digest = Sha256::digest(id.as_bytes());
    let suffix: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}~{suffix}", stem.trim_matches('-'))
}

fn is_stem_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}
