//! In-memory FIFO of records awaiting delivery.
//!
//! Appends come from intake; only the dispatcher removes, and only the
//! prefix it has confirmed as delivered. The mutex is never held across
//! an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::record::NormalizedRecord;
use crate::{AppError, Result};

/// Point-in-time copy of the queue contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Records in queue order at the moment the snapshot was taken.
    pub records: Vec<NormalizedRecord>,
}

impl Snapshot {
    /// Number of records captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the queue was empty when captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Unbounded, ordered buffer of pending records.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: Mutex<VecDeque<NormalizedRecord>>,
}

impl PendingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the tail. Never fails; there is no capacity bound.
    pub fn append(&self, record: NormalizedRecord) {
        self.lock().push_back(record);
    }

    /// Copy the current contents without mutating the queue.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.lock().iter().cloned().collect(),
        }
    }

    /// Remove exactly the first `count` records.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` and leaves the queue untouched when fewer
    /// than `count` records are present.
    pub fn remove_prefix(&self, count: usize) -> Result<()> {
        let mut items = self.lock();
        if count > items.len() {
            return Err(AppError::Queue(format!(
                "cannot remove {count} records, only {} queued",
                items.len()
            )));
        }
        items.drain(..count);
        Ok(())
    }

    /// Current number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<NormalizedRecord>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
