//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid configuration at startup.
    Config(String),
    /// Inbound message event lacks a required field.
    Normalization(String),
    /// A single webhook delivery attempt failed.
    Delivery(String),
    /// Pending queue mutation rejected (e.g. removing past the end).
    Queue(String),
    /// Discord gateway connection or protocol failure.
    Gateway(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Normalization(msg) => write!(f, "normalization: {msg}"),
            Self::Delivery(msg) => write!(f, "delivery: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
            Self::Gateway(msg) => write!(f, "gateway: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Delivery(format!("request timed out: {err}"))
        } else {
            Self::Delivery(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Gateway(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Gateway(format!("malformed payload: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
