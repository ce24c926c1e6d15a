//! Discord gateway v10 frame shapes and constants.

use serde::Deserialize;
use serde_json::{json, Value};

/// Gateway opcodes used by the relay.
pub mod opcode {
    /// Event dispatch.
    pub const DISPATCH: u8 = 0;
    /// Heartbeat, both directions.
    pub const HEARTBEAT: u8 = 1;
    /// Identify (client → gateway).
    pub const IDENTIFY: u8 = 2;
    /// Server asks the client to reconnect.
    pub const RECONNECT: u8 = 7;
    /// Session invalidated.
    pub const INVALID_SESSION: u8 = 9;
    /// First frame after connecting.
    pub const HELLO: u8 = 10;
    /// Heartbeat acknowledged.
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// `GUILDS` intent.
pub const INTENT_GUILDS: u64 = 1 << 0;
/// `GUILD_MESSAGES` intent.
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
/// `MESSAGE_CONTENT` privileged intent.
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Intents needed to see guild channels and message bodies.
pub const RELAY_INTENTS: u64 = INTENT_GUILDS | INTENT_GUILD_MESSAGES | INTENT_MESSAGE_CONTENT;

/// Any frame received from the gateway.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayFrame {
    /// Opcode.
    pub op: u8,
    /// Payload.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (dispatch only).
    pub s: Option<u64>,
    /// Event name (dispatch only).
    pub t: Option<String>,
}

/// Payload of the `HELLO` frame.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

/// Bot user as reported by `READY`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReadyUser {
    /// User snowflake.
    pub id: String,
    /// Username.
    pub username: String,
    /// Legacy tag.
    pub discriminator: Option<String>,
}

impl ReadyUser {
    /// `name#1234` for legacy accounts, plain `name` otherwise.
    #[must_use]
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(tag) if !tag.is_empty() && tag != "0" => format!("{}#{tag}", self.username),
            _ => self.username.clone(),
        }
    }
}

/// Payload of the `READY` dispatch.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Ready {
    /// The bot account.
    pub user: ReadyUser,
    /// Session identifier.
    pub session_id: String,
}

/// Serialized identify frame.
#[must_use]
pub fn identify(token: &str, intents: u64) -> String {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "discord-relay",
                "device": "discord-relay",
            },
        },
    })
    .to_string()
}

/// Serialized heartbeat frame carrying the last seen sequence.
#[must_use]
pub fn heartbeat(sequence: Option<u64>) -> String {
    json!({ "op": opcode::HEARTBEAT, "d": sequence }).to_string()
}

/// Close codes after which reconnecting cannot succeed.
#[must_use]
pub fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}
