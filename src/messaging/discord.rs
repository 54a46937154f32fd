//! Discord messaging adapter using serenity.
//!
//! Maps gateway events onto the orchestrator's inbound-message shape, then
//! routes prefix-form commands (`!forget`, `!assign`, `!removerole`) after
//! the orchestrator has run. Command routing always happens regardless of
//! whether the orchestrator replied; the orchestrator's classification only
//! suppresses the AI response.

use crate::commands::CommandSet;
use crate::conversation::HistoryStore;
use crate::error::{MessagingError, Result};
use crate::llm::gateway::CompletionApi;
use crate::messaging::Outbound;
use crate::orchestrator::ResponseOrchestrator;
use crate::{ConversationId, InboundMessage};

use anyhow::Context as _;
use serenity::all::{
    ChannelId, Client, Context, CreateMessage, EventHandler, GatewayIntents, Member, Message,
    Ready,
};
use serenity::async_trait;
use std::sync::Arc;

/// Outbound half of the adapter: plain text delivery to a channel or DM.
pub struct DiscordOutbound {
    http: Arc<serenity::http::Http>,
}

impl Outbound for DiscordOutbound {
    async fn send(&self, conversation: ConversationId, text: &str) -> std::result::Result<(), MessagingError> {
        ChannelId::new(conversation)
            .say(&self.http, text)
            .await
            .map_err(MessagingError::Discord)?;
        Ok(())
    }
}

/// Serenity event handler wired to the orchestration pipeline.
pub struct DiscordHandler<A> {
    orchestrator: Arc<ResponseOrchestrator<A>>,
    history: Arc<HistoryStore>,
    commands: CommandSet,
    role_name: String,
}

impl<A: CompletionApi + 'static> DiscordHandler<A> {
    pub fn new(
        orchestrator: Arc<ResponseOrchestrator<A>>,
        history: Arc<HistoryStore>,
        commands: CommandSet,
        role_name: String,
    ) -> Self {
        Self {
            orchestrator,
            history,
            commands,
            role_name,
        }
    }

    async fn say(&self, ctx: &Context, channel: ChannelId, text: &str) {
        if let Err(error) = channel.say(&ctx.http, text).await {
            tracing::warn!(%error, channel = channel.get(), "failed to send message");
        }
    }

    async fn dispatch_command(&self, ctx: &Context, msg: &Message, name: &str) {
        match name {
            "forget" => {
                self.history.clear(msg.channel_id.get());
                tracing::info!(conversation = msg.channel_id.get(), "conversation history reset");
                self.say(ctx, msg.channel_id, "Conversation history reset.").await;
            }
            "assign" => self.mutate_role(ctx, msg, RoleChange::Grant).await,
            "removerole" => self.mutate_role(ctx, msg, RoleChange::Revoke).await,
            other => tracing::debug!(command = other, "no handler for command"),
        }
    }

    async fn mutate_role(&self, ctx: &Context, msg: &Message, change: RoleChange) {
        let Some(guild_id) = msg.guild_id else {
            self.say(ctx, msg.channel_id, "Role commands only work in a server.")
                .await;
            return;
        };

        let roles = match guild_id.roles(&ctx.http).await {
            Ok(roles) => roles,
            Err(error) => {
                tracing::warn!(%error, "failed to list guild roles");
                return;
            }
        };

        let Some(role) = roles.values().find(|role| role.name == self.role_name) else {
            self.say(ctx, msg.channel_id, "Role not found, check the name.")
                .await;
            return;
        };

        let result = match change {
            RoleChange::Grant => {
                ctx.http
                    .add_member_role(guild_id, msg.author.id, role.id, Some("assign command"))
                    .await
            }
            RoleChange::Revoke => {
                ctx.http
                    .remove_member_role(guild_id, msg.author.id, role.id, Some("removerole command"))
                    .await
            }
        };

        match result {
            Ok(()) => {
                let line = match change {
                    RoleChange::Grant => {
                        format!("<@{}> welcome to {}.", msg.author.id, self.role_name)
                    }
                    RoleChange::Revoke => {
                        format!("<@{}> just betrayed {}", msg.author.id, self.role_name)
                    }
                };
                self.say(ctx, msg.channel_id, &line).await;
            }
            Err(error) => {
                tracing::warn!(%error, role = %self.role_name, "role mutation failed");
                self.say(ctx, msg.channel_id, "Couldn't change that role.").await;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum RoleChange {
    Grant,
    Revoke,
}

#[async_trait]
impl<A: CompletionApi + 'static> EventHandler for DiscordHandler<A> {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(name = %ready.user.name, id = ready.user.id.get(), "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = ctx.cache.current_user().id;

        let inbound = InboundMessage {
            sender_id: msg.author.id.get(),
            is_from_self: msg.author.id == bot_id,
            conversation_id: msg.channel_id.get(),
            text: msg.content.clone(),
            in_guild: msg.guild_id.is_some(),
            mentions_bot: msg.mentions_user_id(bot_id),
            mention_tokens: vec![format!("<@{bot_id}>"), format!("<@!{bot_id}>")],
        };

        // Typing indicator while a model call is likely in flight. One-shot:
        // Discord clears it after ~10s or on the next message.
        if !inbound.is_from_self && (inbound.is_direct() || inbound.mentions_bot) {
            if let Err(error) = msg.channel_id.broadcast_typing(&ctx.http).await {
                tracing::debug!(%error, "failed to broadcast typing");
            }
        }

        let outbound = DiscordOutbound {
            http: Arc::clone(&ctx.http),
        };
        let outcome = self.orchestrator.handle(&inbound, &outbound).await;
        tracing::debug!(
            ?outcome,
            conversation = inbound.conversation_id,
            "message handled"
        );

        if inbound.is_from_self {
            return;
        }

        if let Some(name) = self.commands.parse(&msg.content) {
            let name = name.to_string();
            self.dispatch_command(&ctx, &msg, &name).await;
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let greeting = format!("welcome to the server {}", member.user.name);
        let builder = CreateMessage::new().content(greeting);
        if let Err(error) = member.user.direct_message(&ctx.http, builder).await {
            // Recipient may disallow DMs; nothing to do about it.
            tracing::debug!(%error, user = member.user.id.get(), "welcome DM not delivered");
        }
    }
}

/// Connect to the Discord gateway and run until the connection ends.
pub async fn run<A: CompletionApi + 'static>(
    token: &str,
    handler: DiscordHandler<A>,
) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("failed to build Discord client")?;

    client.start().await.map_err(MessagingError::Discord)?;
    Ok(())
}
