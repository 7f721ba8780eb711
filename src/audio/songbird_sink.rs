use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{
    audio::sink::{AudioSink, PlaybackDone, VoiceConnector},
    error::PlaybackError,
};

/// Opens songbird voice calls.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn AudioSink>, PlaybackError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Sink(format!("could not join voice channel: {}", e)))?;

        Ok(Box::new(SongbirdSink {
            manager: Arc::clone(&self.manager),
            guild_id,
            call,
            http: self.http.clone(),
            current: SyncMutex::new(None),
        }))
    }
}

/// `AudioSink` over one songbird `Call`.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.handle()?;
        handle.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        done: PlaybackDone,
    ) -> Result<(), PlaybackError> {
        let input = Input::from(HttpRequest::new(self.http.clone(), stream_url.to_string()));
        let handle = self.call.lock().await.play_input(input);

        if let Err(e) = handle.set_volume(volume) {
            warn!("Could not set volume in guild {}: {}", self.guild_id, e);
        }

        let done = Arc::new(SyncMutex::new(Some(done)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let registered = handle.add_event(
                Event::Track(event),
                CompletionHandler {
                    done: Arc::clone(&done),
                },
            );
            if let Err(e) = registered {
                let _ = handle.stop();
                return Err(PlaybackError::Sink(format!(
                    "could not watch track events: {}",
                    e
                )));
            }
        }

        if let Some(previous) = self.current.lock().replace(handle) {
            let _ = previous.stop();
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        let handle = self.handle().ok_or(PlaybackError::NoActiveTrack)?;
        handle
            .pause()
            .map_err(|e| PlaybackError::Sink(e.to_string()))
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        let handle = self.handle().ok_or(PlaybackError::NotPaused)?;
        handle.play().map_err(|e| PlaybackError::Sink(e.to_string()))
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("Track already gone in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn set_volume(&self, volume: f32) {
        if let Some(handle) = self.handle() {
            if let Err(e) = handle.set_volume(volume) {
                warn!("Could not set volume in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn disconnect(&self) {
        self.current.lock().take();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            error!("Error leaving voice in guild {}: {}", self.guild_id, e);
        }
    }
}

/// Fires the completion ticket of one track. Registered for both `End` and
/// `Error`; whichever comes first wins.
struct CompletionHandler {
    done: Arc<SyncMutex<Option<PlaybackDone>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let done = self.done.lock().take()?;

        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };

        debug!("Track finished (epoch {}, error: {:?})", done.epoch(), error);
        done.fire(error);
        Some(Event::Cancel)
    }
}
