use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt, str::FromStr};
use tracing::{debug, info};

use crate::{audio::track::Track, error::PlaybackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Wire value used by the command stream. `Track` travels as `"song"`.
    pub fn as_wire(&self) -> &'static str {
        match self {
            LoopMode::Off => "none",
            LoopMode::Track => "song",
            LoopMode::Queue => "queue",
        }
    }
}

impl FromStr for LoopMode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(LoopMode::Off),
            "song" | "track" => Ok(LoopMode::Track),
            "queue" => Ok(LoopMode::Queue),
            other => Err(PlaybackError::invalid(format!(
                "Unknown loop mode `{}`. Use none, song or queue.",
                other
            ))),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopMode::Off => "None",
            LoopMode::Track => "Song",
            LoopMode::Queue => "Queue",
        };
        f.write_str(label)
    }
}

/// Ordered tracks of one guild plus the current slot.
///
/// `items` never holds `current`: a track is moved out of the queue when it
/// becomes current and only goes back in through loop-queue rotation.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends tracks in the given order. Returns how many were added.
    pub fn enqueue<I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Track>,
    {
        let before = self.items.len();
        for track in tracks {
            debug!("➕ Queued: {}", track.title);
            self.items.push_back(track);
        }
        self.items.len() - before
    }

    /// Moves to the next track according to the loop mode and returns the new
    /// current track, if any.
    pub fn advance(&mut self) -> Option<&Track> {
        match (self.loop_mode, self.current.take()) {
            (LoopMode::Track, Some(current)) => {
                debug!("🔂 Repeating: {}", current.title);
                self.current = Some(current);
            }
            (LoopMode::Queue, Some(current)) => {
                self.items.push_back(current);
                self.current = self.items.pop_front();
            }
            (_, previous) => {
                drop(previous);
                self.current = self.items.pop_front();
            }
        }

        if self.current.is_none() {
            info!("📭 Queue is empty, nothing to play next");
        }
        self.current.as_ref()
    }

    /// Drops the current track, whatever the loop mode, and pops the next one.
    /// Used when the current track could not be played.
    pub fn advance_past_failure(&mut self) -> Option<&Track> {
        if let Some(failed) = self.current.take() {
            debug!("⏭️ Dropping failed track: {}", failed.title);
        }
        self.current = self.items.pop_front();
        self.current.as_ref()
    }

    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Queue shuffled ({} tracks)", self.items.len());
    }

    /// Removes the track at a 1-based position.
    pub fn remove(&mut self, index: i64) -> Result<Track, PlaybackError> {
        let position = usize::try_from(index)
            .ok()
            .filter(|i| (1..=self.items.len()).contains(i))
            .ok_or_else(|| PlaybackError::invalid("Invalid index."))?;

        let removed = self
            .items
            .remove(position - 1)
            .ok_or_else(|| PlaybackError::invalid("Invalid index."))?;
        debug!("❌ Removed position {}: {}", position, removed.title);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Queue cleared");
    }

    /// Empties the queue and the current slot.
    pub fn reset(&mut self) {
        self.items.clear();
        self.current = None;
    }

    pub fn drop_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Loop disabled"),
            LoopMode::Track => info!("🔂 Looping current song"),
            LoopMode::Queue => info!("🔁 Looping queue"),
        }
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn items(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot used to render the `queue` command, capped at `limit` entries.
    pub fn overview(&self, limit: usize) -> QueueOverview {
        QueueOverview {
            current: self.current.clone(),
            upcoming: self.items().take(limit).cloned().collect(),
            remaining: self.len().saturating_sub(limit),
            loop_mode: self.loop_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueOverview {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub remaining: usize,
    pub loop_mode: LoopMode,
}

impl QueueOverview {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.upcoming.is_empty()
    }
}
