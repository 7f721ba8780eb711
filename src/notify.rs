use anyhow::Result;
use async_trait::async_trait;
use serenity::{builder::Builder, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::ui::embeds::Reply;

/// Outbound side of the bot: answers to commands and unsolicited messages.
///
/// Delivery is best effort. Implementations log failures and never return
/// them, so a broken notification can't disturb playback.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Answers the interaction identified by `token`.
    async fn reply(&self, token: &str, reply: Reply);

    /// Posts to a text channel (e.g. "Now Playing").
    async fn announce(&self, channel_id: ChannelId, reply: Reply);
}

/// The two ways of answering a deferred interaction.
#[async_trait]
pub trait InteractionResponder: Send + Sync {
    async fn edit_original(&self, token: &str, reply: &Reply) -> Result<()>;

    async fn send_followup(&self, token: &str, reply: &Reply) -> Result<()>;
}

/// Edits the original response and falls back to a new follow-up message.
/// Both failures are logged and swallowed.
pub async fn deliver_reply(responder: &dyn InteractionResponder, token: &str, reply: &Reply) {
    let Err(edit_error) = responder.edit_original(token, reply).await else {
        debug!("📨 Interaction response edited");
        return;
    };
    error!("Failed to send interaction response: {}", edit_error);

    if let Err(e) = responder.send_followup(token, reply).await {
        error!("Failed to send fallback interaction response: {}", e);
    }
}

/// `NotificationPort` over serenity's HTTP client.
///
/// The client must carry the application id, since interaction webhooks are
/// addressed by it.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl InteractionResponder for DiscordNotifier {
    async fn edit_original(&self, token: &str, reply: &Reply) -> Result<()> {
        reply.to_edit().execute(&self.http, token).await?;
        Ok(())
    }

    async fn send_followup(&self, token: &str, reply: &Reply) -> Result<()> {
        reply
            .to_followup()
            .execute(&self.http, (None, token))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationPort for DiscordNotifier {
    async fn reply(&self, token: &str, reply: Reply) {
        deliver_reply(self, token, &reply).await;
    }

    async fn announce(&self, channel_id: ChannelId, reply: Reply) {
        if let Err(e) = channel_id.send_message(&self.http, reply.to_message()).await {
            error!("Failed to announce in channel {}: {}", channel_id, e);
        }
    }
}
