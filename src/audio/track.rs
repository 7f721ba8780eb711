use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a track was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    YouTube,
    SoundCloud,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::YouTube => "youtube",
            Provider::SoundCloud => "soundcloud",
            Provider::Unknown => "unknown",
        }
    }

    /// Guesses the provider from an extractor name or a URL.
    pub fn detect(hint: &str) -> Self {
        let hint = hint.to_lowercase();
        if hint.contains("youtube") || hint.contains("youtu.be") {
            Provider::YouTube
        } else if hint.contains("soundcloud") {
            Provider::SoundCloud
        } else {
            Provider::Unknown
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved, playable unit of audio with its display metadata.
///
/// `source_url` is usually a page URL; the streamable URL is only resolved
/// when the track is about to play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub source_url: String,
    pub thumbnail: Option<String>,
    pub duration: String,
    pub provider: Provider,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, provider: Provider) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            thumbnail: None,
            duration: UNKNOWN_DURATION.to_string(),
            provider,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_duration_secs(mut self, seconds: Option<f64>) -> Self {
        self.duration = format_duration(seconds);
        self
    }
}

pub const UNKNOWN_DURATION: &str = "N/A";

/// Formats a length in seconds as `m:ss` or `h:mm:ss`.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| s.is_finite() && *s >= 0.0) else {
        return UNKNOWN_DURATION.to_string();
    };

    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(213.0)), "3:33");
        assert_eq!(format_duration(Some(59.6)), "1:00");
        assert_eq!(format_duration(Some(3725.0)), "1:02:05");
        assert_eq!(format_duration(None), "N/A");
        assert_eq!(format_duration(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(Provider::detect("Youtube"), Provider::YouTube);
        assert_eq!(Provider::detect("https://youtu.be/abc"), Provider::YouTube);
        assert_eq!(
            Provider::detect("https://soundcloud.com/artist/song"),
            Provider::SoundCloud
        );
        assert_eq!(Provider::detect("generic"), Provider::Unknown);
    }
}
