//! Wire body POSTed to the webhook for one delivery attempt.

use serde::{Deserialize, Serialize};

use super::record::NormalizedRecord;

/// `{ "batch": [...], "itemCount": n }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    /// Records in queue order.
    pub batch: Vec<NormalizedRecord>,
    /// Always `batch.len()`.
    pub item_count: usize,
}

impl BatchPayload {
    /// Wrap a queue snapshot.
    #[must_use]
    pub fn new(batch: Vec<NormalizedRecord>) -> Self {
        let item_count = batch.len();
        Self { batch, item_count }
    }

    /// Number of records carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count
    }

    /// Whether the batch carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}
