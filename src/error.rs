use thiserror::Error;

/// Errors raised by the playback domain.
///
/// Track-level failures (`Resolution`, `Sink`) never leave the guild worker:
/// they are announced and the queue moves on. The rest are reported back to
/// whoever issued the command and leave the state untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("could not resolve track: {0}")]
    Resolution(String),

    #[error("audio sink failure: {0}")]
    Sink(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("nothing is playing")]
    NoActiveTrack,

    #[error("music is not paused")]
    NotPaused,

    #[error("unknown guild {0}")]
    UnknownTenant(String),
}

impl PlaybackError {
    /// Message shown to the user when this error answers a command.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Resolution(reason) | PlaybackError::Sink(reason) => {
                format!("❌ Error: {}", reason)
            }
            PlaybackError::InvalidCommand(reason) => format!("❌ {}", reason),
            PlaybackError::NoActiveTrack => "❌ Nothing is playing.".to_string(),
            PlaybackError::NotPaused => "❌ Music is not paused.".to_string(),
            PlaybackError::UnknownTenant(guild) => format!("❌ Unknown server {}.", guild),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        PlaybackError::InvalidCommand(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            PlaybackError::NoActiveTrack.user_message(),
            "❌ Nothing is playing."
        );
        assert_eq!(PlaybackError::NotPaused.user_message(), "❌ Music is not paused.");
        assert_eq!(
            PlaybackError::invalid("Invalid index.").user_message(),
            "❌ Invalid index."
        );
        assert_eq!(
            PlaybackError::Resolution("no formats".into()).user_message(),
            "❌ Error: no formats"
        );
    }
}
