use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::{audio::player::PlaybackEvent, error::PlaybackError};

/// Real-time audio output of one guild.
///
/// Implementations own the voice connection. `play` must eventually consume
/// the [`PlaybackDone`] it receives, exactly once, when the stream ends
/// normally, is stopped, or fails.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    async fn play(&self, stream_url: &str, volume: f32, done: PlaybackDone)
        -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn resume(&self) -> Result<(), PlaybackError>;

    /// Stops the live stream, if any. The pending completion fires.
    async fn stop(&self);

    async fn set_volume(&self, volume: f32);

    async fn disconnect(&self);
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn AudioSink>, PlaybackError>;
}

/// Completion ticket handed to [`AudioSink::play`].
///
/// Firing it posts a `TrackEnded` event tagged with the epoch of the playback
/// attempt back to the guild worker, which ignores it if a newer attempt has
/// started since.
#[derive(Debug)]
pub struct PlaybackDone {
    epoch: u64,
    events: UnboundedSender<PlaybackEvent>,
}

impl PlaybackDone {
    pub(crate) fn new(epoch: u64, events: UnboundedSender<PlaybackEvent>) -> Self {
        Self { epoch, events }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Signals the end of the stream. `error` carries the reason when the
    /// stream died instead of finishing.
    pub fn fire(self, error: Option<String>) {
        let epoch = self.epoch;
        if self
            .events
            .send(PlaybackEvent::TrackEnded { epoch, error })
            .is_err()
        {
            debug!("Guild worker gone, dropping completion for epoch {}", epoch);
        }
    }
}
