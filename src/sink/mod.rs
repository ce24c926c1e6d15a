//! Delivery targets for batched records.
//!
//! The dispatcher talks to a [`BatchSink`] so that retry and locking logic
//! stay independent of the HTTP transport.

pub mod webhook;

use std::future::Future;
use std::pin::Pin;

use crate::models::batch::BatchPayload;
use crate::Result;

/// Boxed future returned by [`BatchSink::deliver`].
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Destination that accepts one batch per call, all or nothing.
pub trait BatchSink: Send + Sync {
    /// Deliver the whole payload in a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Delivery`](crate::AppError::Delivery) on a
    /// network error, timeout, or non-success response. The message
    /// carries the status or transport reason for logging.
    fn deliver<'a>(&'a self, payload: &'a BatchPayload) -> DeliveryFuture<'a>;
}
