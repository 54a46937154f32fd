//! Prompt context assembly.

use crate::conversation::history::Turn;

use std::sync::Arc;

/// Ephemeral context for one completion call: the fixed persona prompt, a
/// snapshot of the conversation history taken before the new user turn, and
/// the normalized user text. Message order is significant: system first,
/// then history oldest-to-newest, then the user turn.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system_prompt: Arc<str>,
    pub turns: Vec<Turn>,
    pub user_text: String,
}

impl PromptContext {
    pub fn new(system_prompt: Arc<str>, turns: Vec<Turn>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt,
            turns,
            user_text: user_text.into(),
        }
    }
}
