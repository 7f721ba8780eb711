//! # UI Module
//!
//! User-facing rendering for command answers and announcements.
//!
//! Everything the bot says is a [`embeds::Reply`]: either plain text or a
//! [`embeds::Card`] that is rendered as a serenity `CreateEmbed`. Builders here
//! never touch the network; delivery belongs to [`crate::notify`].

pub mod embeds;
