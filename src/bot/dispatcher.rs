use anyhow::Result;
use futures::FutureExt;
use serenity::{cache::Cache, model::id::GuildId};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::error::TrySendError,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::player::GuildPlaybackState,
    bot::{
        commands::PendingCommand,
        handlers::handle_command,
        registry::SessionRegistry,
    },
    error::PlaybackError,
    notify::NotificationPort,
    ui::embeds::Reply,
};

const BUSY_REPLY: &str = "⏳ Still working on your previous commands, try again in a moment.";
const PANIC_REPLY: &str = "❌ Something went wrong while running that command.";

/// Answers whether a guild is known to the bot.
pub trait GuildDirectory: Send + Sync {
    fn contains(&self, guild_id: GuildId) -> bool;
}

impl GuildDirectory for Arc<Cache> {
    fn contains(&self, guild_id: GuildId) -> bool {
        self.guild(guild_id).is_some()
    }
}

/// Routes inbound command lines to their guild's worker.
///
/// The dispatcher itself never waits on a guild: commands go into the guild's
/// bounded mailbox, and a full mailbox is answered with a busy notice.
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    directory: Arc<dyn GuildDirectory>,
    notifier: Arc<dyn NotificationPort>,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        directory: Arc<dyn GuildDirectory>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            registry,
            directory,
            notifier,
        }
    }

    /// Ingestion loop over newline-delimited JSON. Returns at end of input.
    pub async fn run<R>(&self, mut input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("📥 Listening for commands");
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                info!("📭 Command input closed");
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if !line.is_empty() {
                self.submit_line(line);
            }
        }
    }

    /// Parses and routes one line. Bad lines and unknown guilds are logged
    /// and dropped.
    pub fn submit_line(&self, line: &str) {
        let command = match PendingCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping command line: {}", e);
                return;
            }
        };

        debug!(
            "Received command: {} for guild {} (user {:?}, interaction {:?})",
            command.kind.name(),
            command.guild_id,
            command.user_id,
            command.interaction_id
        );

        if !self.directory.contains(command.guild_id) {
            let err = PlaybackError::UnknownTenant(command.guild_id.to_string());
            error!("Dropping /{}: {}", command.kind.name(), err);
            return;
        }

        let name = command.kind.name();
        let session = self.registry.get_or_create(command.guild_id);
        match session.try_submit(command) {
            Ok(()) => debug!("📨 /{} queued for guild {}", name, session.guild_id()),
            Err(TrySendError::Full(command)) => {
                warn!("🚦 Mailbox full for guild {}, rejecting /{}", command.guild_id, command.kind.name());
                self.reply_later(command.reply_token, Reply::text(BUSY_REPLY));
            }
            Err(TrySendError::Closed(command)) => {
                error!("Worker for guild {} is gone, dropping /{}", command.guild_id, command.kind.name());
                self.reply_later(command.reply_token, Reply::text(PANIC_REPLY));
            }
        }
    }

    fn reply_later(&self, token: String, reply: Reply) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move { notifier.reply(&token, reply).await });
    }
}

/// Runs one command on its guild's worker and sends exactly one reply.
/// A panicking handler is answered with a generic error.
pub(crate) async fn apply(
    state: &mut GuildPlaybackState,
    command: PendingCommand,
    notifier: &dyn NotificationPort,
) {
    let PendingCommand {
        kind,
        guild_id,
        channel_id,
        reply_token,
        ..
    } = command;

    if let Some(channel_id) = channel_id {
        state.set_notify_target(channel_id);
    }

    let name = kind.name();
    let outcome = AssertUnwindSafe(handle_command(state, kind))
        .catch_unwind()
        .await;

    let reply = match outcome {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            debug!("/{} in guild {} failed: {}", name, guild_id, e);
            Reply::text(e.user_message())
        }
        Err(panic) => {
            error!(
                "💥 Handler for /{} panicked in guild {}: {}",
                name,
                guild_id,
                panic_message(panic.as_ref())
            );
            Reply::text(PANIC_REPLY)
        }
    };

    notifier.reply(&reply_token, reply).await;

    debug!(
        "Guild {} after /{}: {:?}, volume {:.0}%, loop {}",
        guild_id,
        name,
        state.status().await,
        state.volume() * 100.0,
        state.loop_mode().as_wire()
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
