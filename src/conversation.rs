//! Conversation history and context assembly.

pub mod context;
pub mod history;

pub use context::PromptContext;
pub use history::{HistoryStore, Role, Turn};
