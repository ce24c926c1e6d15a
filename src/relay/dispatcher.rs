//! Periodic batch flush with bounded retries.
//!
//! Every tick snapshots the [`PendingQueue`], POSTs the snapshot as one
//! batch and, only after the sink confirms it, removes exactly that many
//! records from the head of the queue. Records appended while an attempt
//! is in flight stay queued behind the snapshot.
//!
//! A [`DispatchLock`] guarantees at most one flush (including its retries)
//! runs at any instant. The lock is released by a drop guard, so an error,
//! a panic inside the sink, or cancellation of the tick future cannot leave
//! it held.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::queue::PendingQueue;
use crate::config::DispatchConfig;
use crate::models::batch::BatchPayload;
use crate::sink::BatchSink;
use crate::{AppError, Result};

/// Attempt bound and linear backoff curve for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per tick, including the first.
    pub max_attempts: u32,
    /// Attempt `n` is followed by a wait of `n * backoff_base`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous flush still held the lock; nothing was done.
    Busy,
    /// The queue was empty; no request was made.
    Idle,
    /// The snapshot was accepted and removed from the queue.
    Delivered {
        /// Records delivered.
        items: usize,
        /// Attempt that succeeded (1-based).
        attempts: u32,
    },
    /// Every attempt failed; the snapshot stays queued for a later tick.
    Deferred {
        /// Records in the failed snapshot.
        items: usize,
        /// Attempts made.
        attempts: u32,
    },
}

/// Single-holder flag guarding the flush critical section.
#[derive(Debug, Default)]
pub struct DispatchLock {
    held: AtomicBool,
}

impl DispatchLock {
    /// Take the lock if it is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<DispatchGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DispatchGuard { lock: self })
    }

    /// Whether a flush currently holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the [`DispatchLock`] on drop.
#[derive(Debug)]
pub struct DispatchGuard<'a> {
    lock: &'a DispatchLock,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

/// Owns the dispatch lock and drives deliveries from the pending queue.
pub struct Dispatcher {
    queue: Arc<PendingQueue>,
    sink: Arc<dyn BatchSink>,
    retry: RetryPolicy,
    lock: DispatchLock,
}

impl Dispatcher {
    /// Construct a dispatcher (does not start the timer yet).
    #[must_use]
    pub fn new(queue: Arc<PendingQueue>, sink: Arc<dyn BatchSink>, retry: RetryPolicy) -> Self {
        Self {
            queue,
            sink,
            retry,
            lock: DispatchLock::default(),
        }
    }

    /// Whether a flush is in flight right now.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.lock.is_held()
    }

    /// Run one flush: snapshot, deliver with retries, remove on success.
    pub async fn tick(&self) -> TickOutcome {
        if self.lock.is_held() {
            debug!("previous flush still in flight; skipping tick");
            return TickOutcome::Busy;
        }
        if self.queue.is_empty() {
            return TickOutcome::Idle;
        }

        let Some(_guard) = self.lock.try_acquire() else {
            debug!("lost race for dispatch lock; skipping tick");
            return TickOutcome::Busy;
        };

        let snapshot = self.queue.snapshot();
        if snapshot.is_empty() {
            return TickOutcome::Idle;
        }

        let items = snapshot.len();
        let payload = BatchPayload::new(snapshot.records);
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, items, "sending batch");
            match self.attempt(&payload).await {
                Ok(()) => {
                    info!(items, attempt, "batch delivered");
                    if let Err(err) = self.queue.remove_prefix(items) {
                        warn!(%err, "delivered records were no longer queued");
                    }
                    return TickOutcome::Delivered {
                        items,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    warn!(attempt, max_attempts, %err, "delivery attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        error!(
            items,
            attempts = max_attempts,
            "all delivery attempts failed; batch stays queued for the next tick"
        );
        TickOutcome::Deferred {
            items,
            attempts: max_attempts,
        }
    }

    async fn attempt(&self, payload: &BatchPayload) -> Result<()> {
        AssertUnwindSafe(self.sink.deliver(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Delivery("sink panicked during delivery".into())))
    }

    /// Start the periodic timer.
    ///
    /// The first tick fires one `period` after start. Each tick body runs
    /// as its own task, so a slow flush never delays the schedule; the lock
    /// turns overlapping ticks into no-ops. After `cancel` fires the timer
    /// stops and the returned handle completes once in-flight ticks finish.
    #[must_use]
    pub fn spawn(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                let tracker = TaskTracker::new();
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            let dispatcher = Arc::clone(&self);
                            tracker.spawn(async move {
                                let outcome = dispatcher.tick().await;
                                debug!(?outcome, "dispatch tick finished");
                            });
                        }
                    }
                }

                tracker.close();
                tracker.wait().await;
                info!("dispatcher stopped");
            }
            .instrument(info_span!("dispatcher")),
        )
    }
}
