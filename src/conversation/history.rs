//! Bounded in-memory per-conversation message log.
//!
//! Purely synchronous and in-memory: no I/O, nothing survives a restart.
//! Entries are appended only after a successful model call, so a failed
//! call never pollutes later context with error noise.

use crate::ConversationId;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Originator of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire-format role string for the completion endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message exchanged within a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Rolling per-conversation message log, bounded to `max_history` turns.
///
/// Oldest turns are evicted first when the bound is exceeded. Conversations
/// are created lazily on first append. None of the operations fail.
#[derive(Debug)]
pub struct HistoryStore {
    max_history: usize,
    turns: Mutex<HashMap<ConversationId, Vec<Turn>>>,
}

impl HistoryStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the turns recorded for a conversation, oldest first.
    /// Empty if nothing has been recorded.
    pub fn recent(&self, conversation: ConversationId) -> Vec<Turn> {
        self.lock()
            .get(&conversation)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one turn, evicting the oldest entries past `max_history`.
    pub fn append(&self, conversation: ConversationId, role: Role, content: impl Into<String>) {
        let mut map = self.lock();
        let turns = map.entry(conversation).or_default();
        turns.push(Turn::new(role, content));
        if turns.len() > self.max_history {
            let excess = turns.len() - self.max_history;
            turns.drain(..excess);
        }
    }

    /// Remove all turns for a conversation. No-op if none exist.
    pub fn clear(&self, conversation: ConversationId) {
        self.lock().remove(&conversation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, Vec<Turn>>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
