pub mod ai;
pub mod config;
pub mod persistence;
pub mod state;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use ai::{AnswerSource, GeminiClient};
pub use config::Config;
pub use persistence::{Persistence, PersistenceError, MESSAGES_SLOT};
pub use state::{ChatMessage, ChatRole, Conversation, ERROR_REPLY};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{ConversationStore, SubmitPolicy};
