//! Process lifecycle: `Running -> Draining -> Stopped`.
//!
//! The controller owns the shutdown state. A termination request moves it
//! to `Draining` once; later requests are ignored. The drain loop does not
//! deliver anything itself; it polls the queue until the dispatcher has
//! emptied it, then marks the process `Stopped`.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::queue::PendingQueue;
use crate::config::IntakePolicy;

/// Lifecycle states, in the only order they can occur.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Normal intake and dispatch.
    Running,
    /// Termination requested; waiting for the queue to empty.
    Draining,
    /// Queue drained; the process is tearing down.
    Stopped,
}

/// Owner of the shutdown state.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    intake: IntakePolicy,
}

impl Lifecycle {
    /// Start in `Running` with the given intake-during-drain policy.
    #[must_use]
    pub fn new(intake: IntakePolicy) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self { state, intake }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Whether intake should queue a newly arrived message.
    #[must_use]
    pub fn accepts_intake(&self) -> bool {
        match self.state() {
            LifecycleState::Running => true,
            LifecycleState::Draining => self.intake == IntakePolicy::Accept,
            LifecycleState::Stopped => false,
        }
    }

    /// Handle a termination request. Returns `true` only for the request
    /// that actually started the drain.
    pub fn request_shutdown(&self) -> bool {
        let started = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        });

        if started {
            info!("shutting down; waiting for the message queue to clear");
        } else {
            debug!("shutdown already in progress; ignoring request");
        }
        started
    }

    /// Resolve once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|state| *state != LifecycleState::Running)
            .await;
    }

    /// Wait until the queue is empty, logging progress every
    /// `poll_interval`, then enter `Stopped`.
    ///
    /// Returns immediately if called while still `Running`. Calling it
    /// again once `Stopped` waits for anything queued in between.
    pub async fn drain(&self, queue: &PendingQueue, poll_interval: Duration) {
        if self.state() == LifecycleState::Running {
            debug!("drain called before shutdown was requested");
            return;
        }

        loop {
            let remaining = queue.len();
            if remaining == 0 {
                break;
            }
            info!(remaining, "waiting for queued messages to be sent");
            tokio::time::sleep(poll_interval).await;
        }

        self.state.send_replace(LifecycleState::Stopped);
        info!("queue is empty; relay is going offline");
    }
}
