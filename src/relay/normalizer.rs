//! Conversion of inbound message events into [`NormalizedRecord`]s.
//!
//! Pure functions: no I/O, no logging. Callers decide what to do with a
//! [`AppError::Normalization`].

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::message::MessageEvent;
use crate::models::record::{
    NormalizedRecord, RecordAttachment, RecordAuthor, RecordChannel, RecordGuild, RecordReference,
};
use crate::{AppError, Result};

/// Milliseconds between the Unix epoch and the first second of 2015.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Build the canonical record for one message event.
///
/// # Errors
///
/// Returns `AppError::Normalization` when the message id, channel id or
/// author id is absent or blank, or when no creation time can be derived.
pub fn normalize(event: &MessageEvent) -> Result<NormalizedRecord> {
    let message = &event.message;

    let message_id = required(message.id.as_deref(), "message id")?;
    let channel_id = required(message.channel_id.as_deref(), "channel id")?;
    let author = message
        .author
        .as_ref()
        .ok_or_else(|| AppError::Normalization("author is missing".into()))?;
    let author_id = required(author.id.as_deref(), "author id")?;
    let timestamp = resolve_timestamp(message.timestamp.as_deref(), message_id)?;

    let guild = message.guild_id.as_ref().map(|id| RecordGuild {
        id: id.clone(),
        name: event.guild_name.clone(),
    });

    let reference = message.message_reference.as_ref().map(|reference| RecordReference {
        message_id: reference.message_id.clone(),
        channel_id: reference
            .channel_id
            .clone()
            .unwrap_or_else(|| channel_id.to_owned()),
        guild_id: reference.guild_id.clone(),
    });

    Ok(NormalizedRecord {
        content: message.content.clone().unwrap_or_default(),
        author: RecordAuthor {
            id: author_id.to_owned(),
            username: author.username.clone().unwrap_or_default(),
            discriminator: author
                .discriminator
                .clone()
                .filter(|tag| !tag.is_empty() && tag != "0"),
            bot: author.bot,
        },
        channel: RecordChannel {
            id: channel_id.to_owned(),
            name: event.channel_name.clone(),
            kind: event.channel_kind,
        },
        guild,
        attachments: message
            .attachments
            .iter()
            .map(|attachment| RecordAttachment {
                name: attachment.filename.clone(),
                url: attachment.url.clone(),
                content_type: attachment.content_type.clone(),
                size: attachment.size,
            })
            .collect(),
        embeds: message.embeds.clone(),
        timestamp,
        message_id: message_id.to_owned(),
        reference,
    })
}

/// Render the creation time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Uses the gateway timestamp when it parses as RFC 3339, otherwise the
/// time encoded in the message snowflake.
///
/// # Errors
///
/// Returns `AppError::Normalization` if neither source yields a time.
pub fn resolve_timestamp(raw: Option<&str>, message_id: &str) -> Result<String> {
    if let Some(parsed) = raw.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()) {
        return Ok(render(parsed.with_timezone(&Utc)));
    }

    snowflake_time(message_id).map(render).ok_or_else(|| {
        AppError::Normalization(format!("no usable timestamp for message {message_id}"))
    })
}

/// Creation time encoded in a Discord snowflake.
#[must_use]
pub fn snowflake_time(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let offset = i64::try_from(raw >> 22).ok()?;
    DateTime::from_timestamp_millis(offset.checked_add(DISCORD_EPOCH_MS)?)
}

fn render(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Normalization(format!("{field} is missing"))),
    }
}
