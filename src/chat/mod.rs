//! Conversation core for the chat client.
//!
//! - `types`: conversations, messages, and session snapshots
//! - `errors`: error taxonomy shared by the core
//! - `repository`: durable key-value slot behind the store
//! - `store`: conversation list, active selection, and write-through persistence
//! - `orchestrator`: single in-flight completion lifecycle

pub mod errors;
pub mod orchestrator;
pub mod repository;
pub mod store;
pub mod types;

pub use errors::{ChatError, ChatResult};
pub use orchestrator::{ERROR_FALLBACK, NO_RESPONSE_FALLBACK, Orchestrator, SendOutcome};
pub use repository::{
    ConversationRepository, InMemoryConversationRepository, RepoFuture,
    SqliteConversationRepository,
};
pub use store::ConversationStore;
pub use types::{
    ChatSnapshot, Conversation, ConversationId, Message, PLACEHOLDER_TITLE, Role, derive_title,
};
