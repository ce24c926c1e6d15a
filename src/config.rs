//! Global configuration parsing, validation, and credential loading.
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual values. The bot token is never read from the file;
//! it is loaded from the OS keychain with an environment-variable fallback.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable holding the Discord bot token.
pub const BOT_TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";
/// Environment variable overriding `webhook.url`.
pub const WEBHOOK_URL_ENV: &str = "N8N_WEBHOOK_URL";
/// Environment variable overriding `discord.channel_id`.
pub const CHANNEL_ID_ENV: &str = "TARGET_CHANNEL_ID";

const KEYRING_SERVICE: &str = "discord-relay";
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DiscordConfig {
    /// The one channel whose messages are relayed.
    pub channel_id: String,
    /// Gateway websocket endpoint.
    pub gateway_url: String,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            bot_token: String::new(),
        }
    }
}

/// Downstream webhook settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct WebhookConfig {
    /// Target URL receiving batched POSTs.
    pub url: String,
    /// Per-request timeout.
    pub timeout_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_seconds: 10,
        }
    }
}

impl WebhookConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Batch dispatcher schedule and retry settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DispatchConfig {
    /// Period between dispatch ticks.
    pub interval_ms: u64,
    /// Delivery attempts per tick, including the first.
    pub max_attempts: u32,
    /// Linear backoff unit; attempt `n` waits `n * backoff_base_ms`.
    pub backoff_base_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl DispatchConfig {
    /// Tick period as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Backoff unit as a [`Duration`].
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// What intake does with messages that arrive after shutdown began.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntakePolicy {
    /// Ignore new messages once draining starts.
    #[default]
    Reject,
    /// Keep queueing; the drain waits for them too.
    Accept,
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ShutdownConfig {
    /// How often the drain loop re-checks the queue length.
    pub poll_interval_ms: u64,
    /// Intake behaviour while draining.
    pub intake: IntakePolicy,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            intake: IntakePolicy::Reject,
        }
    }
}

impl ShutdownConfig {
    /// Drain poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Local status endpoint settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct StatusConfig {
    /// Loopback port for `/health` and `/status`; disabled when absent.
    pub port: Option<u16>,
}

/// Global configuration parsed from `config.toml` and the environment.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Discord connectivity settings.
    pub discord: DiscordConfig,
    /// Webhook sink settings.
    pub webhook: WebhookConfig,
    /// Dispatcher schedule and retries.
    pub dispatch: DispatchConfig,
    /// Drain behaviour.
    pub shutdown: ShutdownConfig,
    /// Status endpoint.
    pub status: StatusConfig,
}

impl GlobalConfig {
    /// Build the runtime configuration: optional TOML file, environment
    /// overrides, credentials, then validation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, a
    /// credential is missing, or validation fails.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.load_credentials().await?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string. Missing sections take
    /// their defaults; required values are checked by [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `TARGET_CHANNEL_ID` / `N8N_WEBHOOK_URL` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(channel_id) = non_empty(CHANNEL_ID_ENV) {
            self.discord.channel_id = channel_id;
        }
        if let Some(url) = non_empty(WEBHOOK_URL_ENV) {
            self.webhook.url = url;
        }
    }

    /// Load the Discord bot token from OS keychain with env-var fallback.
    ///
    /// Tries the `discord-relay` keyring service first, then falls back to
    /// the `DISCORD_BOT_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.discord.bot_token = load_credential("discord_bot_token", BOT_TOKEN_ENV).await?;
        Ok(())
    }

    /// Check that every required value is present and sane.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(AppError::Config(format!(
                "discord bot token is missing (set {BOT_TOKEN_ENV})"
            )));
        }

        if self.discord.channel_id.trim().is_empty() {
            return Err(AppError::Config(format!(
                "discord.channel_id is missing (set {CHANNEL_ID_ENV})"
            )));
        }

        if self.webhook.url.trim().is_empty() {
            return Err(AppError::Config(format!(
                "webhook.url is missing (set {WEBHOOK_URL_ENV})"
            )));
        }

        let url = reqwest::Url::parse(&self.webhook.url)
            .map_err(|err| AppError::Config(format!("webhook.url invalid: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "webhook.url must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.dispatch.max_attempts == 0 {
            return Err(AppError::Config(
                "dispatch.max_attempts must be greater than zero".into(),
            ));
        }

        if self.dispatch.interval_ms == 0 {
            return Err(AppError::Config(
                "dispatch.interval_ms must be greater than zero".into(),
            ));
        }

        if self.shutdown.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "shutdown.poll_interval_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
