//! `PostgreSQL` sequence counters.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, instrument};

use cartwheel_core::SequencePurpose;

use super::{RepositoryError, SequenceStore};

/// Counter store backed by `storefront.sequence_counter`.
///
/// The increment is a single upsert, so the row is created at 1 on first use
/// and concurrent increments serialize on the row lock.
#[derive(Clone)]
pub struct PgSequenceStore {
    pool: PgPool,
}

impl PgSequenceStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceStore for PgSequenceStore {
    #[instrument(skip(self), fields(purpose = %purpose, day = %day))]
    async fn increment(
        &self,
        purpose: SequencePurpose,
        day: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.sequence_counter AS counter (purpose, period, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (purpose, period) DO UPDATE SET
                count = counter.count + 1,
                updated_at = NOW()
            RETURNING count
            ",
        )
        .bind(purpose.as_str())
        .bind(day)
        .fetch_one(&self.pool)
        .await?;

        debug!(count, "Incremented sequence counter");
        Ok(count)
    }
}
