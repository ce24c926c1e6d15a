//! HTTP webhook sink (n8n or any endpoint accepting a JSON POST).

use std::time::Duration;

use reqwest::{Client, Url};
use tracing::debug;

use super::{BatchSink, DeliveryFuture};
use crate::models::batch::BatchPayload;
use crate::{AppError, Result};

/// Longest response-body excerpt carried in a delivery error.
const BODY_EXCERPT_CHARS: usize = 200;

/// POSTs each batch as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    /// Build a sink with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the URL does not parse or the HTTP
    /// client cannot be constructed.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|err| AppError::Config(format!("webhook url invalid: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, url })
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, payload: &BatchPayload) -> Result<()> {
        let response = self.client.post(self.url.clone()).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, items = payload.len(), "webhook accepted batch");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        if excerpt.is_empty() {
            Err(AppError::Delivery(format!("webhook returned {status}")))
        } else {
            Err(AppError::Delivery(format!(
                "webhook returned {status}: {excerpt}"
            )))
        }
    }
}

impl BatchSink for WebhookSink {
    fn deliver<'a>(&'a self, payload: &'a BatchPayload) -> DeliveryFuture<'a> {
        Box::pin(self.post(payload))
    }
}
