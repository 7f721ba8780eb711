//! # Sources Module
//!
//! Turns user queries into [`Track`]s and tracks into streamable URLs.
//!
//! Resolution happens in two passes:
//!
//! 1. [`TrackResolver::resolve_metadata`] runs when a `play` command arrives.
//!    It is cheap: it only needs titles, page URLs and thumbnails, and it is
//!    where playlist URLs get expanded into their entries.
//! 2. [`TrackResolver::resolve_stream`] runs right before a track plays and
//!    returns the direct media URL handed to the audio sink. Those URLs expire,
//!    so they are never resolved ahead of time.
//!
//! [`ytdlp::YtDlpResolver`] is the production implementation.

pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::{audio::track::Track, error::PlaybackError};

pub use ytdlp::YtDlpResolver;

/// Result of the metadata pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Single(Track),
    Playlist(Vec<Track>),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a search query or URL into one track or a playlist.
    async fn resolve_metadata(&self, query: &str) -> Result<Resolved, PlaybackError>;

    /// Resolves the direct, streamable URL of a track.
    async fn resolve_stream(&self, track: &Track) -> Result<String, PlaybackError>;
}

static PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(https?://)?((www|m|music)\.)?youtube\.com/playlist\?|^(https?://)?(www\.|m\.)?soundcloud\.com/[^/?#]+/sets/",
    )
    .expect("playlist pattern is valid")
});

/// Recognizes playlist-shaped URLs (YouTube playlists, SoundCloud sets).
pub fn is_playlist_url(query: &str) -> bool {
    PLAYLIST_URL.is_match(query.trim())
}

/// Absolute http(s) URL, as opposed to a search query.
pub fn is_url(query: &str) -> bool {
    Url::parse(query.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
