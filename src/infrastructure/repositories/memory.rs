//! In-memory repositories
//!
//! Process-local stand-ins for the shared store. Several registries or
//! replication services can share one instance through an `Arc` to simulate
//! multiple processes talking to the same database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::{
    domain::{
        entities::{InstanceEntity, InstanceId, SyncRecord, UpsertSummary},
        repositories::{InstanceRepository, MigrationRepository, RecordRepository},
    },
    error::{AppError, Result},
};

/// Instance registry table kept in insertion order
#[derive(Default)]
pub struct InMemoryInstanceRepository {
    rows: RwLock<Vec<InstanceEntity>>,
    unavailable: AtomicBool,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<InstanceEntity> {
        self.rows.read().await.clone()
    }

    pub async fn get(&self, id: InstanceId) -> Option<InstanceEntity> {
        self.rows.read().await.iter().find(|row| row.id == id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn register(&self, instance: &InstanceEntity) -> Result<()> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        if rows.iter().any(|row| row.id == instance.id) {
            return Err(AppError::DatabaseError(format!(
                "Duplicate instance: {}",
                instance.id
            )));
        }
        rows.push(instance.clone());
        Ok(())
    }

    async fn update_heartbeat(
        &self,
        id: InstanceId,
        at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<bool> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.last_heartbeat = at;
                row.metadata = metadata;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_primary(&self, id: InstanceId, is_primary: bool) -> Result<()> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Instance not found: {}", id)))?;
        row.is_primary = is_primary;
        Ok(())
    }

    async fn find_live(&self, since: DateTime<Utc>) -> Result<Vec<InstanceEntity>> {
        self.check_available()?;
        let mut live: Vec<InstanceEntity> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.last_heartbeat > since)
            .cloned()
            .collect();
        // stable: equal start times keep insertion order
        live.sort_by_key(|row| row.start_time);
        Ok(live)
    }

    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let original = rows.len();
        rows.retain(|row| row.last_heartbeat >= before);
        Ok((original - rows.len()) as u64)
    }

    async fn delete(&self, id: InstanceId) -> Result<()> {
        self.check_available()?;
        self.rows.write().await.retain(|row| row.id != id);
        Ok(())
    }

    async fn count_live(&self, since: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| row.last_heartbeat > since).count() as u64)
    }
}

/// One replicated table, indexed by primary key and by `(updated_at, id)`
#[derive(Default)]
struct MemoryTable {
    versions: HashMap<String, DateTime<Utc>>,
    ordered: BTreeMap<(DateTime<Utc>, String), SyncRecord>,
}

impl MemoryTable {
    /// Store `record`, returning true when it replaced an existing row
    fn upsert(&mut self, record: SyncRecord) -> bool {
        let key = (record.updated_at, record.id.clone());
        let previous = self.versions.insert(record.id.clone(), record.updated_at);
        if let Some(updated_at) = previous {
            self.ordered.remove(&(updated_at, record.id.clone()));
        }
        self.ordered.insert(key, record);
        previous.is_some()
    }

    /// Rows with `updated_at > after`, in `(updated_at, id)` order
    fn updated_after(&self, after: DateTime<Utc>) -> impl Iterator<Item = &SyncRecord> {
        self.ordered
            .range((after, String::new())..)
            .skip_while(move |((updated_at, _), _)| *updated_at == after)
            .map(|(_, record)| record)
    }
}

/// Replicated tables keyed by table name
#[derive(Default)]
pub struct InMemoryRecordRepository {
    tables: RwLock<HashMap<String, MemoryTable>>,
    unavailable: AtomicBool,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed rows without going through upsert accounting
    pub async fn insert_records(&self, table: &str, records: Vec<SyncRecord>) {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        for record in records {
            rows.upsert(record);
        }
    }

    /// All rows of a table ordered by `(updated_at, id)`
    pub async fn records(&self, table: &str) -> Vec<SyncRecord> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|rows| rows.ordered.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn find_page(
        &self,
        table: &str,
        updated_after: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SyncRecord>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let page = rows
            .updated_after(updated_after)
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(page)
    }

    async fn max_updated_at(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.ordered.keys().next_back())
            .map(|(updated_at, _)| *updated_at))
    }

    async fn bulk_upsert(&self, table: &str, records: &[SyncRecord]) -> Result<UpsertSummary> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let mut summary = UpsertSummary::default();

        for record in records {
            if rows.upsert(record.clone()) {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }

        Ok(summary)
    }

    async fn count_created_since(&self, table: &str, since: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.ordered
                    .values()
                    .filter(|row| row.created_at >= since)
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn count(&self, table: &str) -> Result<u64> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| rows.versions.len() as u64)
            .unwrap_or(0))
    }
}

/// Applied-migrations log; the last pushed name is the latest
#[derive(Default)]
pub struct InMemoryMigrationRepository {
    applied: RwLock<Vec<String>>,
}

impl InMemoryMigrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_applied(names: &[&str]) -> Self {
        Self {
            applied: RwLock::new(names.iter().map(|name| name.to_string()).collect()),
        }
    }
}

#[async_trait]
impl MigrationRepository for InMemoryMigrationRepository {
    async fn latest_migration(&self) -> Result<Option<String>> {
        Ok(self.applied.read().await.last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_find_live_orders_by_start_time() {
        let repo = InMemoryInstanceRepository::new();
        let now = Utc::now();

        let younger = InstanceEntity::new("10.0.0.2".to_string(), "b".to_string(), 8000)
            .with_start_time(now - Duration::seconds(5));
        let older = InstanceEntity::new("10.0.0.1".to_string(), "a".to_string(), 8000)
            .with_start_time(now - Duration::seconds(10));
        let dead = InstanceEntity::new("10.0.0.3".to_string(), "c".to_string(), 8000)
            .with_start_time(now - Duration::hours(2))
            .with_last_heartbeat(now - Duration::hours(1));

        for instance in [&younger, &older, &dead] {
            repo.register(instance).await.unwrap();
        }

        let live = repo.find_live(now - Duration::minutes(9)).await.unwrap();
        let ids: Vec<_> = live.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![older.id, younger.id]);

        let removed = repo.delete_stale(now - Duration::minutes(9)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.snapshot().await.len(), 2);
        assert_eq!(repo.count_live(now - Duration::minutes(9)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bulk_upsert_counts_inserts_and_updates() {
        let repo = InMemoryRecordRepository::new();
        let first = vec![
            SyncRecord::new("1", json!({ "name": "a" })),
            SyncRecord::new("2", json!({ "name": "b" })),
        ];
        let summary = repo.bulk_upsert("users", &first).await.unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 2, updated: 0 });

        let second = vec![
            SyncRecord::new("2", json!({ "name": "b2" })),
            SyncRecord::new("3", json!({ "name": "c" })),
        ];
        let summary = repo.bulk_upsert("users", &second).await.unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 1 });
        assert_eq!(repo.count("users").await.unwrap(), 3);

        let rows = repo.records("users").await;
        let updated = rows.iter().find(|row| row.id == "2").unwrap();
        assert_eq!(updated.data, json!({ "name": "b2" }));
    }

    #[tokio::test]
    async fn test_find_page_walks_the_updated_at_index() {
        let repo = InMemoryRecordRepository::new();
        let base = Utc::now() - Duration::hours(1);
        let rows = (0..6)
            .map(|n| {
                SyncRecord::new(format!("{}", n), json!({ "n": n }))
                    .with_timestamps(base, base + Duration::seconds(n / 2))
            })
            .collect();
        repo.insert_records("users", rows).await;

        // rows sharing the cursor timestamp are excluded
        let page = repo.find_page("users", base, 1, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4"]);

        // an update moves the row to the end of the order
        let moved = SyncRecord::new("0", json!({ "n": 0 }))
            .with_timestamps(base, base + Duration::minutes(5));
        let summary = repo.bulk_upsert("users", &[moved]).await.unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });
        assert_eq!(repo.count("users").await.unwrap(), 6);

        let tail = repo.find_page("users", base + Duration::seconds(2), 0, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, "0");
        assert_eq!(
            repo.max_updated_at("users").await.unwrap(),
            Some(base + Duration::minutes(5))
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let repo = InMemoryRecordRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.count("users").await,
            Err(AppError::DatabaseError(_))
        ));
    }
}
