use serenity::{
    all::{Colour, Timestamp},
    builder::{
        CreateEmbed, CreateEmbedFooter, CreateInteractionResponseFollowup, CreateMessage,
        EditInteractionResponse,
    },
};

use crate::audio::{
    queue::{LoopMode, QueueOverview},
    track::Track,
};

/// Color palette shared by every card.
pub mod colors {
    use serenity::all::Colour;

    pub const NOW_PLAYING_GREEN: Colour = Colour::from_rgb(0, 255, 0);
    pub const ADDED_TEAL: Colour = Colour::from_rgb(0, 174, 134);
    pub const QUEUE_BLURPLE: Colour = Colour::from_rgb(88, 101, 242);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

#[derive(Debug, Clone, PartialEq)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Structured message rendered as a Discord embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: String,
    pub description: String,
    pub color: Colour,
    pub thumbnail: Option<String>,
    pub fields: Vec<CardField>,
}

impl Card {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: Colour) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            thumbnail: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(CardField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn thumbnail(mut self, url: Option<&str>) -> Self {
        self.thumbnail = url.map(str::to_string);
        self
    }

    pub fn to_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::default()
            .title(&self.title)
            .description(&self.description)
            .color(self.color);

        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        if let Some(thumbnail) = &self.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }

        embed
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
    }
}

/// Answer to a command or an unsolicited announcement.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Card(Card),
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply::Text(content.into())
    }

    /// Replaces the deferred "thinking" response. Text answers clear any
    /// embed left on the original message.
    pub fn to_edit(&self) -> EditInteractionResponse {
        match self {
            Reply::Text(content) => EditInteractionResponse::new()
                .content(content)
                .embeds(Vec::new()),
            Reply::Card(card) => EditInteractionResponse::new().embed(card.to_embed()),
        }
    }

    pub fn to_followup(&self) -> CreateInteractionResponseFollowup {
        match self {
            Reply::Text(content) => CreateInteractionResponseFollowup::new().content(content),
            Reply::Card(card) => CreateInteractionResponseFollowup::new().embed(card.to_embed()),
        }
    }

    pub fn to_message(&self) -> CreateMessage {
        match self {
            Reply::Text(content) => CreateMessage::new().content(content),
            Reply::Card(card) => CreateMessage::new().embed(card.to_embed()),
        }
    }
}

impl From<Card> for Reply {
    fn from(card: Card) -> Self {
        Reply::Card(card)
    }
}

fn track_link(track: &Track) -> String {
    format!("[{}]({})", track.title, track.source_url)
}

pub fn now_playing_card(track: &Track, loop_mode: Option<LoopMode>) -> Card {
    let mut card = Card::new(
        "🎵 Now Playing",
        track_link(track),
        colors::NOW_PLAYING_GREEN,
    )
    .thumbnail(track.thumbnail.as_deref())
    .field("Source", track.provider.as_str(), true)
    .field("Duration", track.duration.as_str(), true);

    if let Some(mode) = loop_mode {
        card = card.field("Loop", mode.to_string(), true);
    }
    card
}

pub fn track_added_card(track: &Track) -> Card {
    Card::new("🎶 Added to Queue", track_link(track), colors::ADDED_TEAL)
        .thumbnail(track.thumbnail.as_deref())
        .field("Source", track.provider.as_str(), true)
        .field("Duration", track.duration.as_str(), true)
}

pub fn playlist_added_text(count: usize) -> String {
    format!("📝 Added **{}** tracks to the queue.", count)
}

/// Renders the `queue` command; `None` when there is nothing to show.
pub fn queue_card(overview: &QueueOverview) -> Option<Card> {
    if overview.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(overview.upcoming.len() + 2);
    if let Some(current) = &overview.current {
        lines.push(format!("Now Playing: **{}**", current.title));
    }
    for (i, track) in overview.upcoming.iter().enumerate() {
        lines.push(format!("{}. **{}**", i + 1, track.title));
    }
    if overview.remaining > 0 {
        lines.push(format!("...and {} more.", overview.remaining));
    }

    let mut card = Card::new("🎼 Current Queue", lines.join("\n"), colors::QUEUE_BLURPLE);
    if overview.loop_mode != LoopMode::Off {
        card = card.field("Loop", overview.loop_mode.to_string(), true);
    }
    Some(card)
}
