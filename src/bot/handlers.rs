use serenity::model::id::ChannelId;
use tracing::info;

use crate::{
    audio::{player::GuildPlaybackState, queue::LoopMode},
    bot::commands::CommandKind,
    error::PlaybackError,
    sources::Resolved,
    ui::embeds::{self, Reply},
};

/// Runs one command against its guild's state and returns the reply.
pub async fn handle_command(
    state: &mut GuildPlaybackState,
    kind: CommandKind,
) -> Result<Reply, PlaybackError> {
    info!("📝 Command /{} in guild {}", kind.name(), state.guild_id());

    match kind {
        CommandKind::Play {
            query,
            voice_channel,
        } => handle_play(state, &query, voice_channel).await,
        CommandKind::Stop => {
            state.stop().await;
            Ok(Reply::text("⏹️ Stopped the music and cleared the queue!"))
        }
        CommandKind::Skip => {
            state.skip().await?;
            Ok(Reply::text("⏭️ Skipped the song!"))
        }
        CommandKind::Queue => Ok(handle_queue(state)),
        CommandKind::Pause => {
            state.pause().await?;
            Ok(Reply::text("⏸️ Paused the music."))
        }
        CommandKind::Resume => {
            state.resume().await?;
            Ok(Reply::text("▶️ Resumed the music."))
        }
        CommandKind::Volume { percent } => {
            let applied = state.set_volume(percent).await;
            Ok(Reply::text(format!("🔊 Volume set to **{}%**.", applied)))
        }
        CommandKind::Loop { mode } => {
            let mode: LoopMode = mode.parse()?;
            state.set_loop_mode(mode);
            Ok(Reply::text(format!("🔁 Loop mode set to **{}**.", mode)))
        }
        CommandKind::Shuffle => {
            state.shuffle();
            Ok(Reply::text("🔀 Shuffled the queue!"))
        }
        CommandKind::Remove { index } => {
            let removed = state.remove(index)?;
            Ok(Reply::text(format!(
                "🗑️ Removed **{}** from the queue.",
                removed.title
            )))
        }
        CommandKind::Clear => {
            state.clear();
            Ok(Reply::text("🧹 Cleared the queue!"))
        }
        CommandKind::NowPlaying => state
            .current()
            .map(|track| embeds::now_playing_card(track, None).into())
            .ok_or(PlaybackError::NoActiveTrack),
    }
}

async fn handle_play(
    state: &mut GuildPlaybackState,
    query: &str,
    voice_channel: Option<ChannelId>,
) -> Result<Reply, PlaybackError> {
    let voice_channel =
        voice_channel.ok_or_else(|| PlaybackError::invalid("You need to be in a voice channel!"))?;

    // Join before resolving so the first track can start right away.
    state.ensure_connected(voice_channel).await?;

    let resolver = state.resolver();
    let resolved = match resolver.resolve_metadata(query).await {
        Ok(resolved) => resolved,
        Err(e) => {
            // Nothing was queued, so a fresh connection must still time out.
            state.release_if_idle();
            return Err(e);
        }
    };

    match resolved {
        Resolved::Single(track) => {
            let card = embeds::track_added_card(&track);
            state.enqueue(vec![track]).await;
            Ok(card.into())
        }
        Resolved::Playlist(tracks) if tracks.is_empty() => {
            state.release_if_idle();
            Err(PlaybackError::Resolution(
                "the playlist has no playable entries".to_string(),
            ))
        }
        Resolved::Playlist(tracks) => {
            let added = state.enqueue(tracks).await;
            Ok(Reply::text(embeds::playlist_added_text(added)))
        }
    }
}

fn handle_queue(state: &GuildPlaybackState) -> Reply {
    embeds::queue_card(&state.overview())
        .map(Reply::from)
        .unwrap_or_else(|| Reply::text("❌ The queue is currently empty."))
}
