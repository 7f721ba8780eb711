//! # Audio Module
//!
//! Per-guild playback for Guild Jukebox.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback State Machine
//! - [`player::GuildPlaybackState`] owns one guild's queue, current track,
//!   loop mode, volume and voice sink
//! - Drives the one-track-at-a-time pipeline: stream resolution, play,
//!   completion, advance, idle teardown
//! - Asynchronous results come back as generation-tagged
//!   [`player::PlaybackEvent`]s, so late completions and timers are harmless
//!
//! ### [`queue`] - Queue Management
//! - FIFO of upcoming tracks plus the current slot
//! - Loop modes (`none`, `song`, `queue`), shuffle, 1-based removal
//!
//! ### [`sink`] - Audio Output Seam
//! - [`sink::AudioSink`] and [`sink::VoiceConnector`] traits
//! - [`songbird_sink`] implements them over songbird voice calls
//!
//! ### [`track`] - Track Metadata
//! - Immutable, resolved unit of playback with display metadata
//!
//! ## Playback Flow
//!
//! ```text
//! enqueue ─► advance ─► start_playback ─► resolve_stream (spawned)
//!               ▲                               │
//!               │                      StreamResolved{epoch}
//!               │                               ▼
//!        TrackEnded{epoch} ◄──── sink.play ◄── worker
//! ```
//!
//! When `advance` finds nothing to play, an idle timer is armed. If it fires
//! with the guild still idle, the sink is disconnected.

pub mod player;
pub mod queue;
pub mod sink;
pub mod songbird_sink;
pub mod track;
