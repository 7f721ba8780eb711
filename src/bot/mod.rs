//! # Bot Module
//!
//! Command intake and per-guild dispatch for Guild Jukebox.
//!
//! ## Architecture
//!
//! ```text
//! stdin ─► CommandDispatcher ─► SessionRegistry ─► guild worker ─► handlers
//!              (parse, route)     (one per guild)    (owns state)    (reply)
//! ```
//!
//! - [`commands`] turns one JSON line into a [`commands::PendingCommand`]
//! - [`dispatcher::CommandDispatcher`] validates the guild and feeds the
//!   guild's bounded mailbox without ever waiting on it
//! - [`registry::SessionRegistry`] lazily spawns one worker per guild; the
//!   worker exclusively owns that guild's
//!   [`GuildPlaybackState`](crate::audio::player::GuildPlaybackState)
//! - [`handlers`] maps each command onto the playback state and renders the
//!   reply
//!
//! ## Guarantees
//!
//! - Commands of one guild run strictly in arrival order; guilds run
//!   concurrently
//! - Every accepted command gets exactly one reply, even if its handler
//!   panics
//! - Malformed lines and unknown guilds are logged and dropped

pub mod commands;
pub mod dispatcher;
pub mod handlers;
pub mod registry;

use parking_lot::Mutex;
use serenity::{
    all::{Context, EventHandler, Ready},
    async_trait,
};
use tokio::sync::oneshot;
use tracing::info;

/// Gateway event handler. Reports the application id once the bot is ready.
pub struct ReadyHandler {
    ready: Mutex<Option<oneshot::Sender<u64>>>,
}

impl ReadyHandler {
    pub fn new() -> (Self, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                ready: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl EventHandler for ReadyHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "✅ {} connected to {} guild(s)",
            ready.user.name,
            ready.guilds.len()
        );

        if let Some(tx) = self.ready.lock().take() {
            let _ = tx.send(ready.application.id.get());
        }
    }
}
