//! Replicated table repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{SyncRecord, UpsertSummary};
use crate::error::Result;

/// Row-level access to the replicated tables of the shared store
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Rows with `updated_at > updated_after`, ordered by `(updated_at, id)`
    async fn find_page(
        &self,
        table: &str,
        updated_after: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SyncRecord>>;

    /// Largest `updated_at` in the table, `None` when empty
    async fn max_updated_at(&self, table: &str) -> Result<Option<DateTime<Utc>>>;

    /// Insert rows by primary key or overwrite every non-key column
    async fn bulk_upsert(&self, table: &str, records: &[SyncRecord]) -> Result<UpsertSummary>;

    /// Count rows created at or after `since`
    async fn count_created_since(&self, table: &str, since: DateTime<Utc>) -> Result<u64>;

    /// Count all rows in the table
    async fn count(&self, table: &str) -> Result<u64>;
}
