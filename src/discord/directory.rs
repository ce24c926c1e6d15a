//! Cache of channel and guild names learned from gateway dispatches.
//!
//! `MESSAGE_CREATE` only carries ids, so names and channel types are looked
//! up here when a message is turned into a [`MessageEvent`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use crate::models::message::{ChannelKind, MessageEvent, RawMessage};

/// Channel object from `GUILD_CREATE`, `CHANNEL_*` and `THREAD_*`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawChannel {
    /// Channel snowflake.
    pub id: String,
    /// Channel type code.
    #[serde(rename = "type")]
    pub kind: Option<u64>,
    /// Channel name.
    pub name: Option<String>,
    /// Owning guild; omitted inside `GUILD_CREATE`.
    pub guild_id: Option<String>,
}

/// Guild object from `GUILD_CREATE` / `GUILD_UPDATE`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawGuild {
    /// Guild snowflake.
    pub id: String,
    /// Guild name.
    pub name: Option<String>,
    /// Guild channels (`GUILD_CREATE` only).
    #[serde(default)]
    pub channels: Vec<RawChannel>,
    /// Active threads (`GUILD_CREATE` only).
    #[serde(default)]
    pub threads: Vec<RawChannel>,
}

/// Payload of `GUILD_DELETE`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawGuildDelete {
    /// Guild snowflake.
    pub id: String,
    /// `true` during an outage; the guild is still joined.
    #[serde(default)]
    pub unavailable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelEntry {
    name: Option<String>,
    kind: Option<ChannelKind>,
}

/// Thread-safe id → name lookup for channels and guilds.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    channels: RwLock<HashMap<String, ChannelEntry>>,
    guilds: RwLock<HashMap<String, Option<String>>>,
}

impl ChannelDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a guild and all channels and threads it lists.
    pub fn upsert_guild(&self, guild: RawGuild) {
        {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            for channel in guild.channels.into_iter().chain(guild.threads) {
                channels.insert(channel.id, entry(channel.name, channel.kind));
            }
        }
        self.guilds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild.id, guild.name);
    }

    /// Forget a guild the bot left. Its channels stay cached; ids are
    /// globally unique so stale entries are harmless.
    pub fn remove_guild(&self, guild_id: &str) {
        self.guilds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(guild_id);
    }

    /// Record or refresh a single channel or thread.
    pub fn upsert_channel(&self, channel: RawChannel) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.id, entry(channel.name, channel.kind));
    }

    /// Forget a deleted channel or thread.
    pub fn remove_channel(&self, channel_id: &str) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel_id);
    }

    /// Cached channel name.
    #[must_use]
    pub fn channel_name(&self, channel_id: &str) -> Option<String> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .and_then(|channel| channel.name.clone())
    }

    /// Cached guild name.
    #[must_use]
    pub fn guild_name(&self, guild_id: &str) -> Option<String> {
        self.guilds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guild_id)
            .cloned()
            .flatten()
    }

    /// Wrap a message with whatever context is cached for it.
    #[must_use]
    pub fn resolve(&self, message: RawMessage) -> MessageEvent {
        let channel = message.channel_id.as_deref().and_then(|id| {
            self.channels
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(id)
                .cloned()
        });
        let guild_name = message
            .guild_id
            .as_deref()
            .and_then(|id| self.guild_name(id));

        let (name, kind) = channel.map_or((None, None), |entry| (entry.name, entry.kind));
        MessageEvent::new(message)
            .with_channel(name, kind)
            .with_guild_name(guild_name)
    }
}

fn entry(name: Option<String>, kind: Option<u64>) -> ChannelEntry {
    ChannelEntry {
        name,
        kind: kind.map(ChannelKind::from_code),
    }
}
