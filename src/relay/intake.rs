//! Entry point for inbound message events.
//!
//! Filters events (shutdown policy, bot authors, unmonitored channels),
//! normalizes the survivors and appends them to the pending queue. Intake
//! never suspends and never fails: a malformed event is logged and dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::lifecycle::Lifecycle;
use super::normalizer::normalize;
use super::queue::PendingQueue;
use crate::models::message::MessageEvent;

/// Why an event did or did not reach the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Normalized and appended.
    Queued,
    /// Arrived while draining under the `reject` policy.
    ShuttingDown,
    /// Author is a bot.
    FromBot,
    /// Posted outside the monitored channel.
    OtherChannel,
    /// Normalization failed; the event was dropped.
    Malformed,
}

/// Applies the relay filters and feeds the queue.
pub struct Intake {
    channel_id: String,
    queue: Arc<PendingQueue>,
    lifecycle: Arc<Lifecycle>,
}

impl Intake {
    /// Build intake for one monitored channel.
    #[must_use]
    pub fn new(channel_id: String, queue: Arc<PendingQueue>, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            channel_id,
            queue,
            lifecycle,
        }
    }

    /// Process one event synchronously.
    pub fn handle(&self, event: &MessageEvent) -> IntakeOutcome {
        if !self.lifecycle.accepts_intake() {
            debug!("ignoring message received during shutdown");
            return IntakeOutcome::ShuttingDown;
        }
        if event.is_from_bot() {
            return IntakeOutcome::FromBot;
        }
        if event.channel_id() != Some(self.channel_id.as_str()) {
            return IntakeOutcome::OtherChannel;
        }

        match normalize(event) {
            Ok(record) => {
                let short_id: String = record.message_id.chars().take(6).collect();
                info!(
                    author = %record.author.username,
                    message = %short_id,
                    "queued message"
                );
                self.queue.append(record);
                IntakeOutcome::Queued
            }
            Err(err) => {
                warn!(%err, "dropping malformed message event");
                IntakeOutcome::Malformed
            }
        }
    }

    /// Consume events from the gateway channel until it closes.
    #[must_use]
    pub fn spawn(self, mut events: mpsc::Receiver<MessageEvent>) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    self.handle(&event);
                }
                info!("intake channel closed");
            }
            .instrument(info_span!("intake")),
        )
    }
}
