//! Inbound Discord message events as received from the gateway.
//!
//! Field names follow the gateway's `MESSAGE_CREATE` payload. Every field
//! the relay depends on is optional here so that a malformed event can be
//! rejected by the normalizer with a precise error instead of failing
//! deserialization of the whole gateway frame.

use serde::{Deserialize, Serialize};

/// Discord channel type, rendered as a `snake_case` tag on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Guild text channel.
    Text,
    /// Direct message.
    Dm,
    /// Guild voice channel.
    Voice,
    /// Group direct message.
    GroupDm,
    /// Channel category.
    Category,
    /// Guild announcement channel.
    Announcement,
    /// Thread inside an announcement channel.
    AnnouncementThread,
    /// Public thread.
    PublicThread,
    /// Private thread.
    PrivateThread,
    /// Stage voice channel.
    Stage,
    /// Student hub directory.
    Directory,
    /// Forum channel.
    Forum,
    /// Media channel.
    Media,
    /// Any type code this build does not know about.
    Unknown,
}

impl ChannelKind {
    /// Map a gateway channel type code to its tag.
    #[must_use]
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Text,
            1 => Self::Dm,
            2 => Self::Voice,
            3 => Self::GroupDm,
            4 => Self::Category,
            5 => Self::Announcement,
            10 => Self::AnnouncementThread,
            11 => Self::PublicThread,
            12 => Self::PrivateThread,
            13 => Self::Stage,
            14 => Self::Directory,
            15 => Self::Forum,
            16 => Self::Media,
            _ => Self::Unknown,
        }
    }
}

/// Message author as sent by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawAuthor {
    /// User snowflake.
    pub id: Option<String>,
    /// Account username.
    pub username: Option<String>,
    /// Legacy four-digit tag; `"0"` for migrated accounts.
    pub discriminator: Option<String>,
    /// Whether the author is a bot account.
    #[serde(default)]
    pub bot: bool,
}

/// File attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawAttachment {
    /// Original file name.
    #[serde(default)]
    pub filename: String,
    /// CDN URL.
    #[serde(default)]
    pub url: String,
    /// MIME type, when Discord detected one.
    pub content_type: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Reply / crosspost reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawReference {
    /// Referenced message.
    pub message_id: Option<String>,
    /// Channel of the referenced message.
    pub channel_id: Option<String>,
    /// Guild of the referenced message.
    pub guild_id: Option<String>,
}

/// `MESSAGE_CREATE` dispatch payload, limited to the fields the relay uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    /// Message snowflake.
    pub id: Option<String>,
    /// Channel the message was posted in.
    pub channel_id: Option<String>,
    /// Guild of the channel; absent for direct messages.
    pub guild_id: Option<String>,
    /// Author.
    pub author: Option<RawAuthor>,
    /// Body text.
    pub content: Option<String>,
    /// ISO-8601 creation time.
    pub timestamp: Option<String>,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
    /// Rich embeds, kept opaque.
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
    /// Reply reference.
    pub message_reference: Option<RawReference>,
}

/// A raw message plus the channel/guild context resolved by the gateway
/// client's channel directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEvent {
    /// The message as delivered by the gateway.
    pub message: RawMessage,
    /// Resolved channel name.
    pub channel_name: Option<String>,
    /// Resolved channel type.
    pub channel_kind: Option<ChannelKind>,
    /// Resolved guild name.
    pub guild_name: Option<String>,
}

impl MessageEvent {
    /// Wrap a raw message with no resolved context.
    #[must_use]
    pub fn new(message: RawMessage) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    /// Attach resolved channel context.
    #[must_use]
    pub fn with_channel(mut self, name: Option<String>, kind: Option<ChannelKind>) -> Self {
        self.channel_name = name;
        self.channel_kind = kind;
        self
    }

    /// Attach the resolved guild name.
    #[must_use]
    pub fn with_guild_name(mut self, name: Option<String>) -> Self {
        self.guild_name = name;
        self
    }

    /// Channel the message was posted in, if present.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.message.channel_id.as_deref()
    }

    /// Whether the author is flagged as a bot.
    #[must_use]
    pub fn is_from_bot(&self) -> bool {
        self.message.author.as_ref().is_some_and(|author| author.bot)
    }
}
