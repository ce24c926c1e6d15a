//! Canonical record relayed to the webhook, one per accepted message.

use serde::{Deserialize, Serialize};

use super::message::ChannelKind;

/// Author identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordAuthor {
    /// User snowflake.
    pub id: String,
    /// Account username.
    pub username: String,
    /// Legacy discriminator, `None` for migrated usernames.
    pub discriminator: Option<String>,
    /// Bot flag.
    pub bot: bool,
}

/// Origin channel identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordChannel {
    /// Channel snowflake.
    pub id: String,
    /// Channel name, when known.
    pub name: Option<String>,
    /// Channel type tag, when known.
    #[serde(rename = "type")]
    pub kind: Option<ChannelKind>,
}

/// Origin guild identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordGuild {
    /// Guild snowflake.
    pub id: String,
    /// Guild name, when known.
    pub name: Option<String>,
}

/// Attachment descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttachment {
    /// File name.
    pub name: String,
    /// CDN URL.
    pub url: String,
    /// MIME type.
    pub content_type: Option<String>,
    /// Size in bytes.
    pub size: u64,
}

/// Reply reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordReference {
    /// Referenced message.
    pub message_id: Option<String>,
    /// Channel of the referenced message.
    pub channel_id: String,
    /// Guild of the referenced message.
    pub guild_id: Option<String>,
}

/// Immutable snapshot of one inbound message, the unit of a batch.
///
/// Records are built once by the normalizer and only ever cloned
/// afterwards; nothing mutates a record once it has been queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// Body text.
    pub content: String,
    /// Author identity.
    pub author: RecordAuthor,
    /// Origin channel.
    pub channel: RecordChannel,
    /// Origin guild; `None` for ungrouped channels.
    pub guild: Option<RecordGuild>,
    /// Attachments in message order.
    pub attachments: Vec<RecordAttachment>,
    /// Embeds, passed through unmodified.
    pub embeds: Vec<serde_json::Value>,
    /// Creation time, UTC, millisecond precision.
    pub timestamp: String,
    /// Message snowflake.
    pub message_id: String,
    /// Reply reference.
    pub reference: Option<RecordReference>,
}
