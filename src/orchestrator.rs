//! Response orchestration: the per-message decision pipeline.
//!
//! For every inbound message this decides, in order: self-message guard,
//! ambient interjection roll, command classification, AI-response
//! eligibility, prompt assembly, gateway call, and history commit. Command
//! execution itself is delegated back to the platform adapter afterwards;
//! classification here only stands the AI response down.

use crate::InboundMessage;
use crate::commands::CommandSet;
use crate::config::PersonaConfig;
use crate::conversation::{HistoryStore, PromptContext, Role};
use crate::llm::gateway::{CompletionApi, CompletionGateway};
use crate::messaging::Outbound;

use rand::Rng as _;
use rand::seq::IndexedRandom as _;
use std::sync::Arc;

/// Fixed user-facing notice when the completion ladder is exhausted.
const OUTAGE_NOTICE: &str = "Completion endpoint is down... try again in a bit.";

/// What the orchestrator did with a message. For logging and tests; every
/// failure path has already been handled by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Message came from the bot itself; nothing ran, not even the roll.
    SelfMessage,
    /// No AI response was warranted (group message without a mention, or a
    /// command invocation).
    NotEligible,
    /// Reply generated, sent, and recorded.
    Replied,
    /// Every ladder rung failed; outage notice sent, history untouched.
    Failed,
}

/// Top-level per-message pipeline. One instance per process; all state it
/// owns (history, ladder position) is process-wide.
pub struct ResponseOrchestrator<A> {
    system_prompt: Arc<str>,
    filler_text: String,
    interjections: Vec<String>,
    interject_odds: u32,
    commands: CommandSet,
    history: Arc<HistoryStore>,
    gateway: CompletionGateway<A>,
}

impl<A: CompletionApi> ResponseOrchestrator<A> {
    pub fn new(
        persona: PersonaConfig,
        interject_odds: u32,
        commands: CommandSet,
        history: Arc<HistoryStore>,
        gateway: CompletionGateway<A>,
    ) -> Self {
        Self {
            system_prompt: persona.system_prompt.into(),
            filler_text: persona.filler_text,
            interjections: persona.interjections,
            interject_odds,
            commands,
            history,
            gateway,
        }
    }

    /// Handle one inbound message end to end. Never returns an error: every
    /// failure ends in a user-facing notice or a log line.
    pub async fn handle<M: Outbound>(&self, message: &InboundMessage, outbound: &M) -> Outcome {
        if message.is_from_self {
            return Outcome::SelfMessage;
        }

        self.maybe_interject(message, outbound).await;

        let is_command = self.commands.is_invocation(&message.text);
        let eligible = (message.is_direct() || message.mentions_bot) && !is_command;
        if !eligible {
            return Outcome::NotEligible;
        }

        let user_text = self.normalize(message);
        let turns = self.history.recent(message.conversation_id);
        let context = PromptContext::new(self.system_prompt.clone(), turns, user_text.clone());

        match self.gateway.complete(&context).await {
            Ok(completion) => {
                for notice in &completion.notices {
                    self.deliver(outbound, message.conversation_id, notice).await;
                }
                self.deliver(outbound, message.conversation_id, &completion.text)
                    .await;

                self.history
                    .append(message.conversation_id, Role::User, user_text);
                self.history
                    .append(message.conversation_id, Role::Assistant, completion.text);
                Outcome::Replied
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    conversation = message.conversation_id,
                    "completion failed, history left untouched"
                );
                self.deliver(outbound, message.conversation_id, OUTAGE_NOTICE)
                    .await;
                Outcome::Failed
            }
        }
    }

    /// Low-probability canned interjection: 1-in-`interject_odds` per
    /// message, one uniformly-chosen line from the word list. Independent
    /// of command classification and AI eligibility.
    async fn maybe_interject<M: Outbound>(&self, message: &InboundMessage, outbound: &M) {
        if self.interjections.is_empty() {
            return;
        }

        // Scoped so the thread-local rng is dropped before the await.
        let word = {
            let mut rng = rand::rng();
            if rng.random_range(1..=self.interject_odds) == 1 {
                self.interjections.choose(&mut rng).cloned()
            } else {
                None
            }
        };

        if let Some(word) = word {
            tracing::debug!(conversation = message.conversation_id, "interjecting");
            self.deliver(outbound, message.conversation_id, &word).await;
        }
    }

    /// Strip the bot mention from the text when present and fall back to
    /// the filler when nothing is left.
    fn normalize(&self, message: &InboundMessage) -> String {
        let mut text = message.text.clone();
        if message.mentions_bot {
            for token in &message.mention_tokens {
                text = text.replace(token, "");
            }
            text = text.trim().to_string();
        }
        if text.trim().is_empty() {
            self.filler_text.clone()
        } else {
            text
        }
    }

    async fn deliver<M: Outbound>(&self, outbound: &M, conversation: u64, text: &str) {
        if let Err(error) = outbound.send(conversation, text).await {
            tracing::warn!(%error, conversation, "failed to deliver message");
        }
    }
}
