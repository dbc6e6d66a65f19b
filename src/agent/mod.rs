//! Conversations, persistence and the session-level runtime.

pub mod context;
pub mod conversation;
pub mod session;
pub mod store;
pub mod turn;

pub use context::{AgentContext, ContextState};
pub use conversation::Conversation;
pub use session::AgentSession;
pub use store::{
    ConversationStore, ConversationStoreConfig, FileConversationStore, InMemoryConversationStore,
};
pub use turn::MessageTurn;
