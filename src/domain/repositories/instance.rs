//! Instance registry repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{InstanceEntity, InstanceId};
use crate::error::Result;

/// Repository interface for the shared instance registry
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Insert a new instance row
    async fn register(&self, instance: &InstanceEntity) -> Result<()>;

    /// Refresh heartbeat and metadata; returns false when the row is gone
    async fn update_heartbeat(
        &self,
        id: InstanceId,
        at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<bool>;

    /// Write the leadership flag for one instance
    async fn set_primary(&self, id: InstanceId, is_primary: bool) -> Result<()>;

    /// Instances whose heartbeat is newer than `since`, oldest `start_time` first
    async fn find_live(&self, since: DateTime<Utc>) -> Result<Vec<InstanceEntity>>;

    /// Delete every instance whose heartbeat is older than `before`
    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Delete one instance row
    async fn delete(&self, id: InstanceId) -> Result<()>;

    /// Count instances whose heartbeat is newer than `since`
    async fn count_live(&self, since: DateTime<Utc>) -> Result<u64>;
}
