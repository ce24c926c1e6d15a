#![forbid(unsafe_code)]

//! Batching relay from one Discord channel to an HTTP webhook.

pub mod config;
pub mod discord;
pub mod errors;
pub mod models;
pub mod relay;
pub mod sink;
pub mod status;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
