use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::SyncRecord;
use crate::error::Result;

/// Remote deployment that rows are pulled from
#[async_trait]
pub trait ReplicationSource: Send + Sync {
    /// Schema-compatibility token of the source deployment
    async fn db_version(&self) -> Result<String>;

    /// Up to `limit` rows of `table` with `updated_at > updated_after`,
    /// oldest first.
    async fn fetch_table(
        &self,
        table: &str,
        updated_after: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SyncRecord>>;
}
