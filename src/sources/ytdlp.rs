use async_trait::async_trait;
use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use tokio::{process::Command, time::timeout};
use tracing::{debug, info, warn};

use super::{is_playlist_url, is_url, Resolved, TrackResolver};
use crate::{
    audio::track::{Provider, Track},
    config::Config,
    error::PlaybackError,
};

/// `TrackResolver` backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    executable: String,
    timeout: Duration,
    max_playlist_size: usize,
}

/// Subset of yt-dlp's JSON info dict we care about.
#[derive(Debug, Default, Deserialize)]
struct InfoDict {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    duration: Option<f64>,
    extractor: Option<String>,
    ie_key: Option<String>,
    entries: Option<Vec<InfoDict>>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            executable: config.ytdlp_path.clone(),
            timeout: Duration::from_secs(config.resolve_timeout_secs),
            max_playlist_size: config.max_playlist_size,
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, PlaybackError> {
        debug!("🔧 {} {}", self.executable, args.join(" "));

        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                PlaybackError::Resolution(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlaybackError::Resolution(format!("could not run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("yt-dlp failed")
                .trim()
                .to_string();
            warn!("❌ yt-dlp exited with {}: {}", output.status, reason);
            return Err(PlaybackError::Resolution(reason));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn metadata_args(&self, query: &str) -> Vec<String> {
        let mut args = vec!["-J".to_string(), "--no-warnings".to_string()];

        if is_playlist_url(query) {
            args.push("--flat-playlist".to_string());
            args.push("--playlist-end".to_string());
            args.push(self.max_playlist_size.to_string());
            args.push(query.to_string());
        } else {
            args.push("--no-playlist".to_string());
            if is_url(query) {
                args.push(query.to_string());
            } else {
                args.push(format!("ytsearch1:{}", query));
            }
        }

        args
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve_metadata(&self, query: &str) -> Result<Resolved, PlaybackError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::invalid("Tell me what to play."));
        }

        let raw = self.run(&self.metadata_args(query)).await?;
        let info: InfoDict = serde_json::from_str(&raw)
            .map_err(|e| PlaybackError::Resolution(format!("unreadable yt-dlp output: {}", e)))?;

        let resolved = resolved_from_info(info, query, is_playlist_url(query))?;
        match &resolved {
            Resolved::Single(track) => info!("🔍 Resolved: {}", track.title),
            Resolved::Playlist(tracks) => info!("📋 Playlist expanded to {} tracks", tracks.len()),
        }
        Ok(resolved)
    }

    async fn resolve_stream(&self, track: &Track) -> Result<String, PlaybackError> {
        let args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-g".to_string(),
            track.source_url.clone(),
        ];

        let raw = self.run(&args).await?;
        first_stream_url(&raw).ok_or_else(|| {
            PlaybackError::Resolution(format!("no playable stream for {}", track.title))
        })
    }
}

fn first_stream_url(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| is_url(line))
        .map(str::to_string)
}

fn resolved_from_info(
    mut info: InfoDict,
    query: &str,
    playlist: bool,
) -> Result<Resolved, PlaybackError> {
    match info.entries.take() {
        Some(entries) if playlist => {
            let provider = Provider::detect(query);
            let tracks = entries
                .into_iter()
                .filter_map(|entry| track_from_info(entry, provider))
                .collect();
            Ok(Resolved::Playlist(tracks))
        }
        Some(entries) => entries
            .into_iter()
            .find_map(|entry| {
                let provider = provider_of(&entry, query);
                track_from_info(entry, provider)
            })
            .map(Resolved::Single)
            .ok_or_else(|| PlaybackError::Resolution(format!("no results for `{}`", query))),
        None => {
            let provider = provider_of(&info, query);
            track_from_info(info, provider)
                .map(Resolved::Single)
                .ok_or_else(|| PlaybackError::Resolution(format!("no playable URL for `{}`", query)))
        }
    }
}

fn provider_of(info: &InfoDict, query: &str) -> Provider {
    [info.extractor.as_deref(), info.ie_key.as_deref(), info.webpage_url.as_deref()]
        .into_iter()
        .flatten()
        .map(Provider::detect)
        .find(|p| *p != Provider::Unknown)
        .unwrap_or_else(|| Provider::detect(query))
}

fn track_from_info(info: InfoDict, provider: Provider) -> Option<Track> {
    let source_url = info.webpage_url.or(info.url)?;
    let thumbnail = info
        .thumbnail
        .or_else(|| info.thumbnails.into_iter().last().map(|t| t.url));

    let mut track = Track::new(
        info.title.unwrap_or_else(|| "Unknown".to_string()),
        source_url,
        provider,
    )
    .with_duration_secs(info.duration);

    if let Some(thumbnail) = thumbnail {
        track = track.with_thumbnail(thumbnail);
    }
    Some(track)
}
