//! Outbound delivery trait.

use crate::ConversationId;
use crate::error::MessagingError;

/// Outbound side of a messaging adapter: deliver text to a conversation.
///
/// The orchestrator guarantees every `text` fits the platform's 2000
/// character ceiling before calling this. Delivery failures are reported
/// but never retried; callers log and move on.
pub trait Outbound: Send + Sync {
    /// Send `text` to the destination conversation.
    fn send(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), MessagingError>> + Send;
}
