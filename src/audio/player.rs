use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{LoopMode, PlaybackQueue, QueueOverview},
        sink::{AudioSink, PlaybackDone, VoiceConnector},
        track::Track,
    },
    config::Config,
    error::PlaybackError,
    notify::NotificationPort,
    sources::TrackResolver,
    ui::embeds::{self, Reply},
};

/// Collaborators shared by every guild.
#[derive(Clone)]
pub struct PlaybackServices {
    pub resolver: Arc<dyn TrackResolver>,
    pub connector: Arc<dyn VoiceConnector>,
    pub notifier: Arc<dyn NotificationPort>,
}

/// Per-guild tunables taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub queue_display_limit: usize,
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            queue_display_limit: config.queue_display_limit,
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(30),
            queue_display_limit: 10,
        }
    }
}

/// Asynchronous results funneled back into the guild worker.
#[derive(Debug)]
pub enum PlaybackEvent {
    /// The second resolution pass finished for playback attempt `epoch`.
    StreamResolved {
        epoch: u64,
        result: Result<String, PlaybackError>,
    },
    /// The sink finished (or lost) the stream of attempt `epoch`.
    TrackEnded { epoch: u64, error: Option<String> },
    /// The idle grace period armed as `idle_epoch` ran out.
    IdleElapsed { idle_epoch: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Playing,
    Paused,
    Disconnected,
}

/// Playback state machine of one guild.
///
/// Owned exclusively by the guild's worker task; every mutation, including
/// sink completions and timers, arrives through that worker, so there is no
/// locking here. Async results are tagged:
///
/// - `epoch` grows with every playback attempt and on `stop`. Stream
///   resolutions and completions from an older epoch are discarded.
/// - `idle_epoch` grows whenever the idle teardown is armed or cancelled. A
///   timer that fires late for an older epoch does nothing.
pub struct GuildPlaybackState {
    guild_id: GuildId,
    queue: PlaybackQueue,
    volume: f32,
    sink: Option<Box<dyn AudioSink>>,
    notify_target: Option<ChannelId>,
    services: PlaybackServices,
    settings: PlayerSettings,
    epoch: u64,
    idle_epoch: u64,
    idle_cancel: Option<CancellationToken>,
    events: UnboundedSender<PlaybackEvent>,
}

impl GuildPlaybackState {
    /// Creates the state and the receiver its worker must drain.
    pub fn new(
        guild_id: GuildId,
        services: PlaybackServices,
        settings: PlayerSettings,
    ) -> (Self, UnboundedReceiver<PlaybackEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let state = Self {
            guild_id,
            queue: PlaybackQueue::new(),
            volume: settings.default_volume.clamp(0.0, 1.0),
            sink: None,
            notify_target: None,
            services,
            settings,
            epoch: 0,
            idle_epoch: 0,
            idle_cancel: None,
            events,
        };
        (state, events_rx)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn resolver(&self) -> Arc<dyn TrackResolver> {
        Arc::clone(&self.services.resolver)
    }

    pub fn set_notify_target(&mut self, channel_id: ChannelId) {
        self.notify_target = Some(channel_id);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.queue.loop_mode()
    }

    pub fn current(&self) -> Option<&Track> {
        self.queue.current()
    }

    #[cfg(test)]
    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn overview(&self) -> QueueOverview {
        self.queue.overview(self.settings.queue_display_limit)
    }

    #[cfg(test)]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn status(&self) -> PlayerStatus {
        let Some(sink) = &self.sink else {
            return PlayerStatus::Disconnected;
        };
        if !sink.is_connected().await {
            PlayerStatus::Disconnected
        } else if sink.is_paused().await {
            PlayerStatus::Paused
        } else if sink.is_playing().await {
            PlayerStatus::Playing
        } else {
            PlayerStatus::Idle
        }
    }

    /// Makes sure the guild has a live voice connection in some channel.
    pub async fn ensure_connected(&mut self, channel_id: ChannelId) -> Result<(), PlaybackError> {
        if let Some(sink) = &self.sink {
            if sink.is_connected().await {
                return Ok(());
            }
            warn!("🔌 Voice connection lost in guild {}, reconnecting", self.guild_id);
        }

        let sink = self
            .services
            .connector
            .connect(self.guild_id, channel_id)
            .await?;
        info!("🔊 Connected to voice channel {} in guild {}", channel_id, self.guild_id);
        self.sink = Some(sink);
        Ok(())
    }

    /// Appends tracks and starts playing if the guild was idle.
    /// Returns how many tracks were added.
    pub async fn enqueue(&mut self, tracks: Vec<Track>) -> usize {
        let added = self.queue.enqueue(tracks);
        if added == 0 {
            return 0;
        }

        self.cancel_idle_teardown();
        info!(
            "➕ {} track(s) queued in guild {} ({} waiting)",
            added,
            self.guild_id,
            self.queue.len()
        );

        if self.queue.current().is_none() {
            self.advance().await;
        }
        added
    }

    /// Moves to the next track according to the loop mode.
    pub async fn advance(&mut self) {
        self.cancel_idle_teardown();
        let next = self.queue.advance().cloned();
        self.after_advance(next).await;
    }

    async fn skip_failed(&mut self) {
        self.cancel_idle_teardown();
        let next = self.queue.advance_past_failure().cloned();
        self.after_advance(next).await;
    }

    async fn after_advance(&mut self, next: Option<Track>) {
        match next {
            Some(track) => self.start_playback(track).await,
            None => self.schedule_idle_teardown(),
        }
    }

    /// Starts the second resolution pass for `track`. The result comes back
    /// as a `StreamResolved` event.
    async fn start_playback(&mut self, track: Track) {
        let connected = match &self.sink {
            Some(sink) => sink.is_connected().await,
            None => false,
        };
        if !connected {
            warn!(
                "🔇 No voice connection in guild {}, dropping {} ({} still queued)",
                self.guild_id,
                track.title,
                self.queue.len()
            );
            self.queue.drop_current();
            self.announce(Reply::text(format!(
                "❌ Not connected to a voice channel, skipped **{}**. Use /play to reconnect.",
                track.title
            )))
            .await;
            return;
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let resolver = Arc::clone(&self.services.resolver);
        let events = self.events.clone();

        info!("🎵 Preparing: {} (guild {})", track.title, self.guild_id);
        tokio::spawn(async move {
            let result = resolver.resolve_stream(&track).await;
            let _ = events.send(PlaybackEvent::StreamResolved { epoch, result });
        });
    }

    /// Applies an asynchronous event. Called only by the guild worker.
    pub async fn handle_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::StreamResolved { epoch, result } => {
                self.on_stream_resolved(epoch, result).await
            }
            PlaybackEvent::TrackEnded { epoch, error } => self.on_track_ended(epoch, error).await,
            PlaybackEvent::IdleElapsed { idle_epoch } => self.on_idle_elapsed(idle_epoch).await,
        }
    }

    async fn on_stream_resolved(&mut self, epoch: u64, result: Result<String, PlaybackError>) {
        if epoch != self.epoch {
            debug!("Discarding stale stream for epoch {} (now {})", epoch, self.epoch);
            return;
        }
        let Some(track) = self.queue.current().cloned() else {
            return;
        };

        let outcome = match result {
            Ok(stream_url) => self.play_stream(&stream_url, epoch).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!("▶️ Now playing: {} (guild {})", track.title, self.guild_id);
                let card = embeds::now_playing_card(&track, Some(self.queue.loop_mode()));
                self.announce(card.into()).await;
            }
            Err(e) => {
                error!("Error starting {} in guild {}: {}", track.title, self.guild_id, e);
                self.report_failure(&e).await;
                self.skip_failed().await;
            }
        }
    }

    async fn play_stream(&self, stream_url: &str, epoch: u64) -> Result<(), PlaybackError> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| PlaybackError::Sink("not connected to a voice channel".into()))?;
        if !sink.is_connected().await {
            return Err(PlaybackError::Sink("voice connection lost".into()));
        }

        let done = PlaybackDone::new(epoch, self.events.clone());
        sink.play(stream_url, self.volume, done).await
    }

    async fn on_track_ended(&mut self, epoch: u64, error: Option<String>) {
        if epoch != self.epoch {
            debug!("Ignoring stale completion for epoch {} (now {})", epoch, self.epoch);
            return;
        }

        match error {
            Some(reason) => {
                warn!("❌ Stream failed in guild {}: {}", self.guild_id, reason);
                self.report_failure(&PlaybackError::Sink(reason)).await;
                self.skip_failed().await;
            }
            None => {
                debug!("Track finished in guild {}", self.guild_id);
                self.advance().await;
            }
        }
    }

    /// Arms the idle teardown when nothing is playing or waiting, e.g. after
    /// a `play` joined voice but queued nothing.
    pub fn release_if_idle(&mut self) {
        if self.queue.current().is_none() && self.queue.is_empty() {
            self.schedule_idle_teardown();
        }
    }

    fn schedule_idle_teardown(&mut self) {
        self.cancel_idle_teardown();
        if self.sink.is_none() {
            return;
        }

        let idle_epoch = self.idle_epoch;
        let token = CancellationToken::new();
        self.idle_cancel = Some(token.clone());

        let events = self.events.clone();
        let timeout = self.settings.idle_timeout;
        debug!("⏳ Guild {} idle, leaving in {:?}", self.guild_id, timeout);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = events.send(PlaybackEvent::IdleElapsed { idle_epoch });
                }
            }
        });
    }

    fn cancel_idle_teardown(&mut self) {
        if let Some(token) = self.idle_cancel.take() {
            token.cancel();
        }
        self.idle_epoch += 1;
    }

    async fn on_idle_elapsed(&mut self, idle_epoch: u64) {
        if idle_epoch != self.idle_epoch
            || self.queue.current().is_some()
            || !self.queue.is_empty()
        {
            debug!("Idle timer {} no longer relevant in guild {}", idle_epoch, self.guild_id);
            return;
        }
        self.idle_cancel = None;

        if let Some(sink) = self.sink.take() {
            if sink.is_connected().await {
                sink.disconnect().await;
                info!("👋 Left voice in guild {} after being idle", self.guild_id);
            }
        }
    }

    pub async fn skip(&mut self) -> Result<(), PlaybackError> {
        match &self.sink {
            Some(sink) if sink.is_playing().await => {
                // The sink's completion drives the advance.
                sink.stop().await;
                info!("⏭️ Skipped in guild {}", self.guild_id);
                Ok(())
            }
            _ => Err(PlaybackError::NoActiveTrack),
        }
    }

    pub async fn pause(&mut self) -> Result<(), PlaybackError> {
        match &self.sink {
            Some(sink) if sink.is_playing().await => sink.pause().await,
            _ => Err(PlaybackError::NoActiveTrack),
        }
    }

    pub async fn resume(&mut self) -> Result<(), PlaybackError> {
        match &self.sink {
            Some(sink) if sink.is_paused().await => sink.resume().await,
            _ => Err(PlaybackError::NotPaused),
        }
    }

    /// Stores `percent / 100`, clamped to `[0, 1]`, and applies it to the live
    /// stream. Returns the effective percentage.
    pub async fn set_volume(&mut self, percent: i64) -> u8 {
        let percent = percent.clamp(0, 100) as u8;
        self.volume = f32::from(percent) / 100.0;

        if let Some(sink) = &self.sink {
            if sink.is_playing().await || sink.is_paused().await {
                sink.set_volume(self.volume).await;
            }
        }
        info!("🔊 Volume set to {}% in guild {}", percent, self.guild_id);
        percent
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.queue.set_loop_mode(mode);
    }

    pub fn shuffle(&mut self) {
        self.queue.shuffle();
    }

    pub fn remove(&mut self, index: i64) -> Result<Track, PlaybackError> {
        self.queue.remove(index)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Drops everything and leaves voice. In-flight resolutions, completions
    /// and the idle timer are invalidated.
    pub async fn stop(&mut self) {
        self.queue.reset();
        self.epoch += 1;
        self.cancel_idle_teardown();

        if let Some(sink) = self.sink.take() {
            sink.stop().await;
            sink.disconnect().await;
        }
        info!("⏹️ Stopped and cleared guild {}", self.guild_id);
    }

    async fn report_failure(&self, error: &PlaybackError) {
        let reason = match error {
            PlaybackError::Resolution(reason) | PlaybackError::Sink(reason) => reason.clone(),
            other => other.to_string(),
        };
        self.announce(Reply::text(format!("❌ Error playing song: {}", reason)))
            .await;
    }

    async fn announce(&self, reply: Reply) {
        match self.notify_target {
            Some(channel_id) => self.services.notifier.announce(channel_id, reply).await,
            None => debug!("No text channel for guild {}, announcement dropped", self.guild_id),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the player and dispatcher tests.

    use super::*;
    use crate::{
        audio::{sink::AudioSink, track::Provider},
        sources::{MockTrackResolver, Resolved},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    pub struct SinkLog {
        pub connected: bool,
        pub playing: bool,
        pub paused: bool,
        pub volume: f32,
        pub played: Vec<String>,
        pub connects: usize,
        pub disconnects: usize,
        pub pending: Option<PlaybackDone>,
        pub fail_play: bool,
    }

    /// In-memory sink. `finish` plays the role of the transport reaching the
    /// end of the stream.
    #[derive(Clone, Default)]
    pub struct FakeSink {
        pub log: Arc<Mutex<SinkLog>>,
    }

    impl FakeSink {
        pub fn finish(&self) {
            let done = {
                let mut log = self.log.lock();
                log.playing = false;
                log.paused = false;
                log.pending.take()
            };
            if let Some(done) = done {
                done.fire(None);
            }
        }

        pub fn fail(&self, reason: &str) {
            let done = {
                let mut log = self.log.lock();
                log.playing = false;
                log.pending.take()
            };
            if let Some(done) = done {
                done.fire(Some(reason.to_string()));
            }
        }

        pub fn played(&self) -> Vec<String> {
            self.log.lock().played.clone()
        }

        pub fn disconnects(&self) -> usize {
            self.log.lock().disconnects
        }
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        async fn is_connected(&self) -> bool {
            self.log.lock().connected
        }

        async fn is_playing(&self) -> bool {
            self.log.lock().playing
        }

        async fn is_paused(&self) -> bool {
            self.log.lock().paused
        }

        async fn play(
            &self,
            stream_url: &str,
            volume: f32,
            done: PlaybackDone,
        ) -> Result<(), PlaybackError> {
            let mut log = self.log.lock();
            if log.fail_play {
                return Err(PlaybackError::Sink("transport rejected stream".into()));
            }
            log.playing = true;
            log.paused = false;
            log.volume = volume;
            log.played.push(stream_url.to_string());
            log.pending = Some(done);
            Ok(())
        }

        async fn pause(&self) -> Result<(), PlaybackError> {
            let mut log = self.log.lock();
            log.playing = false;
            log.paused = true;
            Ok(())
        }

        async fn resume(&self) -> Result<(), PlaybackError> {
            let mut log = self.log.lock();
            log.playing = true;
            log.paused = false;
            Ok(())
        }

        async fn stop(&self) {
            self.finish();
        }

        async fn set_volume(&self, volume: f32) {
            self.log.lock().volume = volume;
        }

        async fn disconnect(&self) {
            let mut log = self.log.lock();
            log.connected = false;
            log.disconnects += 1;
        }
    }

    pub struct FakeConnector {
        pub sink: FakeSink,
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn connect(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> Result<Box<dyn AudioSink>, PlaybackError> {
            {
                let mut log = self.sink.log.lock();
                log.connected = true;
                log.connects += 1;
            }
            Ok(Box::new(self.sink.clone()))
        }
    }

    /// Records every notification, in order.
    #[derive(Clone)]
    pub struct RecordingNotifier {
        pub sent: mpsc::UnboundedSender<(Option<String>, Reply)>,
    }

    impl RecordingNotifier {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<(Option<String>, Reply)>) {
            let (sent, rx) = mpsc::unbounded_channel();
            (Self { sent }, rx)
        }
    }

    #[async_trait]
    impl NotificationPort for RecordingNotifier {
        async fn reply(&self, token: &str, reply: Reply) {
            let _ = self.sent.send((Some(token.to_string()), reply));
        }

        async fn announce(&self, _channel_id: ChannelId, reply: Reply) {
            let _ = self.sent.send((None, reply));
        }
    }

    pub fn track(title: &str) -> Track {
        Track::new(title, format!("https://youtu.be/{}", title), Provider::YouTube)
    }

    /// Resolver whose stream pass returns `stream:<title>`, failing for
    /// titles starting with `bad`. Queries resolve to a single track named
    /// after the query, or to a playlist when they start with `list:`.
    /// Queries starting with `missing` fail to resolve.
    pub fn resolver() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_metadata().returning(|query: &str| {
            if query.starts_with("missing") {
                return Err(PlaybackError::Resolution(format!("no results for {}", query)));
            }
            match query.strip_prefix("list:") {
                Some(names) => Ok(Resolved::Playlist(
                    names.split(',').filter(|n| !n.is_empty()).map(track).collect(),
                )),
                None => Ok(Resolved::Single(track(query))),
            }
        });
        resolver.expect_resolve_stream().returning(|t: &Track| {
            if t.title.starts_with("bad") {
                Err(PlaybackError::Resolution(format!("{} is unavailable", t.title)))
            } else {
                Ok(format!("stream:{}", t.title))
            }
        });
        resolver
    }

    pub fn services(sink: &FakeSink) -> (PlaybackServices, mpsc::UnboundedReceiver<(Option<String>, Reply)>) {
        let (notifier, sent) = RecordingNotifier::new();
        let services = PlaybackServices {
            resolver: Arc::new(resolver()),
            connector: Arc::new(FakeConnector { sink: sink.clone() }),
            notifier: Arc::new(notifier),
        };
        (services, sent)
    }

    pub fn guild() -> GuildId {
        GuildId::new(4242)
    }

    pub fn channel() -> ChannelId {
        ChannelId::new(7)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use pretty_assertions::assert_eq;

    struct Harness {
        state: GuildPlaybackState,
        events: UnboundedReceiver<PlaybackEvent>,
        sink: FakeSink,
        sent: mpsc::UnboundedReceiver<(Option<String>, Reply)>,
    }

    impl Harness {
        async fn connected() -> Self {
            let sink = FakeSink::default();
            let (services, sent) = services(&sink);
            let (mut state, events) =
                GuildPlaybackState::new(guild(), services, PlayerSettings::default());
            state.set_notify_target(channel());
            state.ensure_connected(channel()).await.unwrap();
            Self { state, events, sink, sent }
        }

        /// Feeds the next worker event into the state.
        async fn pump(&mut self) {
            let event = self.events.recv().await.expect("worker channel open");
            self.state.handle_event(event).await;
        }

        fn current(&self) -> Option<String> {
            self.state.current().map(|t| t.title.clone())
        }

        fn queued(&self) -> Vec<String> {
            self.state.queue().items().map(|t| t.title.clone()).collect()
        }

        fn announcements(&mut self) -> Vec<Reply> {
            let mut out = Vec::new();
            while let Ok((_, reply)) = self.sent.try_recv() {
                out.push(reply);
            }
            out
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_natural_advance() {
        let mut h = Harness::connected().await;

        h.state.enqueue(vec![track("a")]).await;
        h.state.enqueue(vec![track("b")]).await;
        assert_eq!(h.current().as_deref(), Some("a"));
        assert_eq!(h.queued(), vec!["b"]);

        h.pump().await; // stream for a
        assert_eq!(h.sink.played(), vec!["stream:a"]);
        assert_eq!(h.state.status().await, PlayerStatus::Playing);

        h.sink.finish();
        h.pump().await; // a ended
        assert_eq!(h.current().as_deref(), Some("b"));
        assert!(h.queued().is_empty());

        h.pump().await; // stream for b
        assert_eq!(h.sink.played(), vec!["stream:a", "stream:b"]);

        let announcements = h.announcements();
        assert_eq!(announcements.len(), 2);
        assert!(matches!(&announcements[0], Reply::Card(card) if card.title == "🎵 Now Playing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_teardown_disconnects_once() {
        let mut h = Harness::connected().await;
        h.state.enqueue(vec![track("a")]).await;
        h.pump().await;

        h.sink.finish();
        h.pump().await;
        assert!(h.state.current().is_none());
        assert_eq!(h.sink.disconnects(), 0);

        h.pump().await; // idle timer fires after the grace period
        assert_eq!(h.sink.disconnects(), 1);
        assert!(!h.state.has_sink());
        assert_eq!(h.state.status().await, PlayerStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_grace_period_cancels_teardown() {
        let mut h = Harness::connected().await;
        h.state.enqueue(vec![track("a")]).await;
        h.pump().await;
        h.sink.finish();
        h.pump().await; // idle now, timer armed

        tokio::time::sleep(Duration::from_secs(10)).await;
        h.state.enqueue(vec![track("b")]).await;
        h.pump().await; // stream for b

        assert_eq!(h.sink.played(), vec!["stream:a", "stream:b"]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.sink.disconnects(), 0);
        assert!(h.state.has_sink());
    }

    #[tokio::test]
    async fn test_late_idle_timer_is_ignored() {
        let mut h = Harness::connected().await;
        h.state.schedule_idle_teardown();
        let stale = h.state.idle_epoch;
        h.state.enqueue(vec![track("a")]).await;

        h.state
            .handle_event(PlaybackEvent::IdleElapsed { idle_epoch: stale })
            .await;

        assert_eq!(h.sink.disconnects(), 0);
        assert!(h.state.has_sink());
    }

    #[tokio::test]
    async fn test_skip_advances_exactly_once() {
        let mut h = Harness::connected().await;
        h.state.enqueue(vec![track("a"), track("b"), track("c")]).await;
        h.pump().await;

        h.state.skip().await.unwrap();
        // A duplicate completion for the same attempt must not advance twice.
        let epoch = h.state.epoch;
        h.pump().await;
        h.state
            .handle_event(PlaybackEvent::TrackEnded { epoch, error: None })
            .await;

        assert_eq!(h.current().as_deref(), Some("b"));
        assert_eq!(h.queued(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_an_error() {
        let mut h = Harness::connected().await;
        assert_eq!(h.state.skip().await, Err(PlaybackError::NoActiveTrack));
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_track() {
        let mut h = Harness::connected().await;
        h.state
            .enqueue(vec![track("bad-one"), track("good")])
            .await;

        h.pump().await; // bad-one fails to resolve, good is started
        assert_eq!(h.current().as_deref(), Some("good"));
        h.pump().await;
        assert_eq!(h.sink.played(), vec!["stream:good"]);

        let announcements = h.announcements();
        assert!(matches!(
            &announcements[0],
            Reply::Text(text) if text.starts_with("❌ Error playing song")
        ));
    }

    #[tokio::test]
    async fn test_failing_track_is_dropped_even_when_looping() {
        let mut h = Harness::connected().await;
        h.state.set_loop_mode(LoopMode::Track);
        h.state.enqueue(vec![track("bad")]).await;

        h.pump().await;
        assert!(h.state.current().is_none());
        assert!(h.queued().is_empty());
    }

    #[tokio::test]
    async fn test_failing_track_leaves_looping_queue() {
        let mut h = Harness::connected().await;
        h.state.set_loop_mode(LoopMode::Queue);
        h.state.enqueue(vec![track("bad"), track("a")]).await;

        h.pump().await; // bad fails, a starts
        h.pump().await;
        h.sink.finish();
        h.pump().await; // a rotates back in alone
        h.pump().await;

        assert_eq!(h.sink.played(), vec!["stream:a", "stream:a"]);
        assert_eq!(h.current().as_deref(), Some("a"));
        assert!(h.queued().is_empty());
    }

    #[tokio::test]
    async fn test_lost_connection_drops_track_and_announces() {
        let mut h = Harness::connected().await;
        h.sink.log.lock().connected = false;

        h.state.enqueue(vec![track("a"), track("b")]).await;

        assert!(h.state.current().is_none());
        assert_eq!(h.queued(), vec!["b"]);
        assert!(h.events.try_recv().is_err());

        let announcements = h.announcements();
        assert_eq!(announcements.len(), 1);
        assert!(matches!(
            &announcements[0],
            Reply::Text(text) if text.starts_with("❌ Not connected to a voice channel")
        ));
    }

    #[tokio::test]
    async fn test_sink_rejection_skips_track() {
        let mut h = Harness::connected().await;
        h.sink.log.lock().fail_play = true;
        h.state.enqueue(vec![track("a"), track("b")]).await;

        h.pump().await;
        assert_eq!(h.current().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_stream_error_mid_track_skips_track() {
        let mut h = Harness::connected().await;
        h.state.set_loop_mode(LoopMode::Track);
        h.state.enqueue(vec![track("a"), track("b")]).await;
        h.pump().await;

        h.sink.fail("connection reset");
        h.pump().await;

        assert_eq!(h.current().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_loop_track_replays_on_completion() {
        let mut h = Harness::connected().await;
        h.state.set_loop_mode(LoopMode::Track);
        h.state.enqueue(vec![track("a"), track("b")]).await;
        h.pump().await;

        for _ in 0..3 {
            h.sink.finish();
            h.pump().await;
            h.pump().await;
        }

        assert_eq!(h.sink.played(), vec!["stream:a"; 4]);
        assert_eq!(h.queued(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_resolution() {
        let mut h = Harness::connected().await;
        h.state.enqueue(vec![track("a"), track("b")]).await;

        h.state.stop().await;
        h.pump().await; // the stream for a arrives after stop

        assert!(h.sink.played().is_empty());
        assert!(h.state.current().is_none());
        assert!(h.queued().is_empty());
        assert_eq!(h.sink.disconnects(), 1);
        assert!(!h.state.has_sink());
    }

    #[tokio::test]
    async fn test_stop_ignores_completion_of_stopped_track() {
        let mut h = Harness::connected().await;
        h.state.enqueue(vec![track("a"), track("b")]).await;
        h.pump().await;

        h.state.stop().await;
        h.pump().await; // completion fired by the stop

        assert!(h.state.current().is_none());
        assert_eq!(h.sink.played(), vec!["stream:a"]);
    }

    #[tokio::test]
    async fn test_pause_resume_and_volume() {
        let mut h = Harness::connected().await;
        assert_eq!(h.state.pause().await, Err(PlaybackError::NoActiveTrack));
        assert_eq!(h.state.resume().await, Err(PlaybackError::NotPaused));

        h.state.enqueue(vec![track("a")]).await;
        h.pump().await;
        assert_eq!(h.sink.log.lock().volume, 0.5);

        h.state.pause().await.unwrap();
        assert_eq!(h.state.status().await, PlayerStatus::Paused);
        assert_eq!(h.state.pause().await, Err(PlaybackError::NoActiveTrack));

        assert_eq!(h.state.set_volume(150).await, 100);
        assert_eq!(h.state.volume(), 1.0);
        assert_eq!(h.sink.log.lock().volume, 1.0);

        h.state.resume().await.unwrap();
        assert_eq!(h.state.status().await, PlayerStatus::Playing);

        assert_eq!(h.state.set_volume(-20).await, 0);
        assert_eq!(h.state.volume(), 0.0);
    }

    #[tokio::test]
    async fn test_no_playback_without_connection() {
        let sink = FakeSink::default();
        let (services, _sent) = services(&sink);
        let (mut state, mut events) =
            GuildPlaybackState::new(guild(), services, PlayerSettings::default());

        state.enqueue(vec![track("a"), track("b")]).await;

        assert!(state.current().is_none());
        assert_eq!(state.queue().len(), 1);
        assert!(events.try_recv().is_err());
    }
}
