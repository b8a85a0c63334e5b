//! Order and invoice number generation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::instrument;

use cartwheel_core::{MAX_SEQUENCE, SequencePurpose, format_sequence_number};

use crate::db::{RepositoryError, SequenceStore};
use crate::services::retry::StoragePolicy;

/// Errors from drawing a sequence number.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The day's counter passed the four-digit limit.
    #[error("{purpose} sequence exhausted for {day}: more than {MAX_SEQUENCE} numbers drawn")]
    Exhausted {
        purpose: SequencePurpose,
        day: NaiveDate,
    },

    #[error("sequence storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Draws `PREFIX-YYYYMMDD-NNNN` numbers from per-day counters.
///
/// Increments are never retried: a timed-out increment may have committed,
/// and replaying it would skip a number.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Arc<dyn SequenceStore>,
    policy: StoragePolicy,
}

impl SequenceGenerator {
    #[must_use]
    pub fn new(store: Arc<dyn SequenceStore>, policy: StoragePolicy) -> Self {
        Self { store, policy }
    }

    /// Next number for `purpose` on the UTC day of `as_of`.
    ///
    /// # Errors
    ///
    /// Returns `SequenceError::Exhausted` past 9999 numbers in a day. The
    /// increment that overflowed stays burned.
    #[instrument(skip(self), fields(purpose = %purpose))]
    pub async fn next(
        &self,
        purpose: SequencePurpose,
        as_of: DateTime<Utc>,
    ) -> Result<String, SequenceError> {
        let day = as_of.date_naive();
        let count = self
            .policy
            .write(self.store.increment(purpose, day))
            .await?;

        u32::try_from(count)
            .ok()
            .and_then(|count| format_sequence_number(purpose, day, count))
            .ok_or_else(|| {
                tracing::error!(count, day = %day, "Sequence counter exhausted");
                SequenceError::Exhausted { purpose, day }
            })
    }
}
