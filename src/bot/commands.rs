use serde::Deserialize;
use serde_json::{Map, Value};
use serenity::model::id::{ChannelId, GuildId, UserId};
use thiserror::Error;

/// Why an inbound line could not become a [`PendingCommand`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid command JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("invalid {field}: {value}")]
    InvalidId { field: &'static str, value: String },

    #[error("`{command}` needs a valid `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
}

/// One inbound line, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
    command: String,
    guild_id: Value,
    #[serde(default)]
    channel_id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    token: String,
    #[serde(default)]
    interaction_id: Option<Value>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Play {
        query: String,
        voice_channel: Option<ChannelId>,
    },
    Stop,
    Skip,
    Queue,
    Pause,
    Resume,
    Volume {
        percent: i64,
    },
    /// The mode stays raw so a bad value is answered instead of dropped.
    Loop {
        mode: String,
    },
    Shuffle,
    Remove {
        index: i64,
    },
    Clear,
    NowPlaying,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Play { .. } => "play",
            CommandKind::Stop => "stop",
            CommandKind::Skip => "skip",
            CommandKind::Queue => "queue",
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Volume { .. } => "volume",
            CommandKind::Loop { .. } => "loop",
            CommandKind::Shuffle => "shuffle",
            CommandKind::Remove { .. } => "remove",
            CommandKind::Clear => "clear",
            CommandKind::NowPlaying => "nowplaying",
        }
    }
}

/// A fully parsed command, ready for its guild's worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub kind: CommandKind,
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub user_id: Option<UserId>,
    pub reply_token: String,
    pub interaction_id: Option<String>,
}

impl PendingCommand {
    /// Parses one line of the form
    /// `{command, guildId, channelId?, userId?, token, interactionId?, ...payload}`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let raw: RawCommand = serde_json::from_str(line)?;

        let guild_id = GuildId::new(snowflake("guildId", &raw.guild_id)?);
        let channel_id = optional_snowflake("channelId", raw.channel_id.as_ref())?.map(ChannelId::new);
        let user_id = optional_snowflake("userId", raw.user_id.as_ref())?.map(UserId::new);
        let interaction_id = raw.interaction_id.as_ref().and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let kind = parse_kind(&raw.command, &raw.payload)?;

        Ok(Self {
            kind,
            guild_id,
            channel_id,
            user_id,
            reply_token: raw.token,
            interaction_id,
        })
    }
}

fn parse_kind(command: &str, payload: &Map<String, Value>) -> Result<CommandKind, ParseError> {
    let kind = match command {
        "play" => {
            let query = payload
                .get("query")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .ok_or(ParseError::MissingField {
                    command: "play",
                    field: "query",
                })?;
            let voice_channel = optional_snowflake("voiceChannelId", payload.get("voiceChannelId"))?
                .map(ChannelId::new);
            CommandKind::Play {
                query: query.to_string(),
                voice_channel,
            }
        }
        "stop" => CommandKind::Stop,
        "skip" => CommandKind::Skip,
        "queue" => CommandKind::Queue,
        "pause" => CommandKind::Pause,
        "resume" => CommandKind::Resume,
        "volume" => CommandKind::Volume {
            percent: integer(payload.get("volume")).ok_or(ParseError::MissingField {
                command: "volume",
                field: "volume",
            })?,
        },
        "loop" => CommandKind::Loop {
            mode: payload
                .get("mode")
                .and_then(Value::as_str)
                .ok_or(ParseError::MissingField {
                    command: "loop",
                    field: "mode",
                })?
                .to_string(),
        },
        "shuffle" => CommandKind::Shuffle,
        "remove" => CommandKind::Remove {
            index: integer(payload.get("index")).ok_or(ParseError::MissingField {
                command: "remove",
                field: "index",
            })?,
        },
        "clear" => CommandKind::Clear,
        "nowplaying" => CommandKind::NowPlaying,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(kind)
}

/// Accepts integers, integral floats and numeric strings.
fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Discord ids arrive as strings or numbers; 0 is never valid.
fn snowflake(field: &'static str, value: &Value) -> Result<u64, ParseError> {
    let id = match value {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };

    id.filter(|id| *id != 0).ok_or_else(|| ParseError::InvalidId {
        field,
        value: value.to_string(),
    })
}

fn optional_snowflake(field: &'static str, value: Option<&Value>) -> Result<Option<u64>, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => snowflake(field, value).map(Some),
    }
}
