use dashmap::DashMap;
use futures::FutureExt;
use serenity::model::id::GuildId;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, UnboundedReceiver};
use tracing::{debug, error, info};

use crate::{
    audio::player::{GuildPlaybackState, PlaybackEvent, PlaybackServices, PlayerSettings},
    bot::{commands::PendingCommand, dispatcher::apply},
    notify::NotificationPort,
};

/// Handle to one guild's worker.
///
/// The worker task owns the guild's [`GuildPlaybackState`]; the handle only
/// feeds its mailbox. Cloning is cheap.
#[derive(Clone)]
pub struct GuildSession {
    guild_id: GuildId,
    commands: mpsc::Sender<PendingCommand>,
}

impl GuildSession {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Queues a command without waiting. Fails when the mailbox is full.
    pub fn try_submit(&self, command: PendingCommand) -> Result<(), TrySendError<PendingCommand>> {
        self.commands.try_send(command)
    }

    /// Whether both handles feed the same worker.
    #[cfg(test)]
    pub fn same_session(&self, other: &GuildSession) -> bool {
        self.commands.same_channel(&other.commands)
    }
}

/// Process-wide map from guild to its session. Sessions are created on first
/// use and live as long as the process.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildSession>,
    services: PlaybackServices,
    settings: PlayerSettings,
    command_buffer: usize,
}

impl SessionRegistry {
    pub fn new(services: PlaybackServices, settings: PlayerSettings, command_buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            services,
            settings,
            command_buffer: command_buffer.max(1),
        }
    }

    /// Returns the guild's session, spawning its worker on first use.
    /// Concurrent callers for the same guild always get the same session.
    pub fn get_or_create(&self, guild_id: GuildId) -> GuildSession {
        if let Some(session) = self.sessions.get(&guild_id) {
            return session.clone();
        }

        self.sessions
            .entry(guild_id)
            .or_insert_with(|| self.spawn_session(guild_id))
            .clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn spawn_session(&self, guild_id: GuildId) -> GuildSession {
        let (commands, mailbox) = mpsc::channel(self.command_buffer);
        let (state, events) =
            GuildPlaybackState::new(guild_id, self.services.clone(), self.settings.clone());

        info!("🆕 Session created for guild {}", guild_id);
        tokio::spawn(run_session(
            state,
            mailbox,
            events,
            Arc::clone(&self.services.notifier),
        ));

        GuildSession { guild_id, commands }
    }
}

/// Worker loop of one guild: commands in arrival order, interleaved with
/// playback events. Runs until every session handle is gone.
async fn run_session(
    mut state: GuildPlaybackState,
    mut mailbox: Receiver<PendingCommand>,
    mut events: UnboundedReceiver<PlaybackEvent>,
    notifier: Arc<dyn NotificationPort>,
) {
    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => {
                debug!("Guild {} event: {:?}", state.guild_id(), event);
                let handled = AssertUnwindSafe(state.handle_event(event))
                    .catch_unwind()
                    .await;
                if handled.is_err() {
                    error!("💥 Playback event handler panicked in guild {}", state.guild_id());
                }
            }

            command = mailbox.recv() => match command {
                Some(command) => apply(&mut state, command, notifier.as_ref()).await,
                None => break,
            },
        }
    }

    debug!("Session for guild {} closed", state.guild_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::testing::{guild, services, FakeSink};

    fn registry() -> Arc<SessionRegistry> {
        let (services, _sent) = services(&FakeSink::default());
        Arc::new(SessionRegistry::new(services, PlayerSettings::default(), 4))
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let registry = registry();

        let first = registry.get_or_create(guild());
        let second = registry.get_or_create(guild());
        let other = registry.get_or_create(GuildId::new(1));

        assert!(first.same_session(&second));
        assert!(!first.same_session(&other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_has_one_winner() {
        let registry = registry();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(guild()) })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(sessions.iter().all(|s| s.same_session(&sessions[0])));
    }
}
