//! Credential/model escalation ladder.
//!
//! One ordered rung list, built at startup: for each credential in
//! configured order, every model in configured order. Walking forward
//! first exhausts the models under a credential, then moves to the next
//! credential starting back at the primary model.
//!
//! The active rung index is process-wide and sticky: escalation only ever
//! advances it, and nothing resets it short of a restart. Once a fallback
//! rung is active, the primary is never attempted again.

use std::sync::atomic::{AtomicUsize, Ordering};

/// One attemptable (credential, model) pair.
#[derive(Debug, Clone)]
pub struct Rung {
    pub api_key: String,
    pub model: String,
    key_index: usize,
    model_index: usize,
}

/// Ordered escalation ladder with a sticky active index.
#[derive(Debug)]
pub struct Ladder {
    rungs: Vec<Rung>,
    active: AtomicUsize,
}

impl Ladder {
    /// Build the credential-major rung product. `api_keys` and `models`
    /// are both in primary-first order and must be non-empty (enforced by
    /// config validation).
    pub fn new(api_keys: &[String], models: &[String]) -> Self {
        let mut rungs = Vec::with_capacity(api_keys.len() * models.len());
        for (key_index, api_key) in api_keys.iter().enumerate() {
            for (model_index, model) in models.iter().enumerate() {
                rungs.push(Rung {
                    api_key: api_key.clone(),
                    model: model.clone(),
                    key_index,
                    model_index,
                });
            }
        }
        Self {
            rungs,
            active: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Index of the rung new calls start from.
    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn rung(&self, index: usize) -> &Rung {
        &self.rungs[index]
    }

    /// Advance the sticky index past `from`, returning the next rung index
    /// or `None` when the ladder is exhausted. Monotonic under concurrent
    /// calls: the index never moves backwards.
    pub fn advance(&self, from: usize) -> Option<usize> {
        let next = from + 1;
        if next >= self.rungs.len() {
            return None;
        }
        self.active.fetch_max(next, Ordering::SeqCst);
        Some(next)
    }

    /// Short human-readable notice describing an escalation step, distinct
    /// from the model's own reply text.
    pub fn escalation_notice(&self, from: usize, to: usize) -> String {
        let from = &self.rungs[from];
        let to = &self.rungs[to];
        if to.key_index != from.key_index {
            if to.key_index == 1 {
                "(switched to backup key, still alive)".to_string()
            } else {
                format!("(switched to backup key #{}, still alive)", to.key_index)
            }
        } else {
            format!("(falling back to {})", to.model)
        }
    }
}
