use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    /// Taken from the ready event when unset.
    pub application_id: Option<u64>,

    // Playback
    pub default_volume: f32,
    pub idle_timeout_secs: u64,
    pub queue_display_limit: usize,
    pub max_playlist_size: usize,

    // Dispatch
    pub command_buffer: usize,
    pub worker_threads: usize,

    // Resolver
    pub ytdlp_path: String,
    pub resolve_timeout_secs: u64,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, val)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: match std::env::var("APPLICATION_ID") {
                Ok(val) if !val.trim().is_empty() => Some(
                    val.trim()
                        .parse()
                        .with_context(|| format!("Invalid APPLICATION_ID: {}", val))?,
                ),
                _ => None,
            },

            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            queue_display_limit: env_or("QUEUE_DISPLAY_LIMIT", defaults.queue_display_limit)?,
            max_playlist_size: env_or("MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,

            command_buffer: env_or("COMMAND_BUFFER", defaults.command_buffer)?,
            worker_threads: env_or("WORKER_THREADS", defaults.worker_threads)?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            resolve_timeout_secs: env_or("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks that catch common configuration mistakes.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Buffers, limits and timeouts must be greater than 0
    /// - The application id, when given, must not be 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.application_id == Some(0) {
            anyhow::bail!("Application ID cannot be 0");
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.queue_display_limit == 0 {
            anyhow::bail!("Queue display limit must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.command_buffer == 0 {
            anyhow::bail!("Command buffer must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("YTDLP_PATH cannot be empty");
        }

        Ok(())
    }

    /// Summary for the startup log. Never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {}\n  \
            Playback: {}% vol, {}s idle timeout, {} queue entries shown, {} max playlist\n  \
            Dispatch: {} commands per guild mailbox, {} worker threads\n  \
            Resolver: {} ({}s timeout)",
            self.application_id
                .map_or("from gateway".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.idle_timeout_secs,
            self.queue_display_limit,
            self.max_playlist_size,
            self.command_buffer,
            self.worker_threads,
            self.ytdlp_path,
            self.resolve_timeout_secs,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: None,

            default_volume: 0.5,
            idle_timeout_secs: 30,
            queue_display_limit: 10,
            max_playlist_size: 500,

            command_buffer: 32,
            worker_threads: num_cpus::get(),

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_timeout_secs, 30);
        assert_eq!(config.queue_display_limit, 10);
    }

    #[test]
    fn test_volume_out_of_range_is_rejected() {
        let config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let zero_buffer = Config {
            command_buffer: 0,
            ..Config::default()
        };
        let zero_app = Config {
            application_id: Some(0),
            ..Config::default()
        };
        assert!(zero_buffer.validate().is_err());
        assert!(zero_app.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            application_id: Some(42),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("App ID 42"));
        assert!(summary.contains("50% vol"));
    }
}
