//! Destination side of replication
//!
//! Each table is pulled in chunks newer than the local high-water mark and
//! upserted by primary key. The mark is re-read after every chunk, so a run
//! interrupted halfway resumes where the committed rows end.
//!
//! Rows sharing one `updated_at` across a chunk boundary can be skipped,
//! since the next request asks strictly for newer rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::source::ReplicationSource;
use crate::domain::repositories::{MigrationRepository, RecordRepository};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub requests: u64,
    pub fetched: u64,
    pub inserted: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub db_version: String,
    pub tables: Vec<TableReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReplicationReport {
    pub fn rows_fetched(&self) -> u64 {
        self.tables.iter().map(|t| t.fetched).sum()
    }
}

pub struct ReplicationService {
    source: Arc<dyn ReplicationSource>,
    records: Arc<dyn RecordRepository>,
    migrations: Arc<dyn MigrationRepository>,
    tables: Vec<String>,
    chunk_size: u64,
}

impl ReplicationService {
    pub fn new(
        source: Arc<dyn ReplicationSource>,
        records: Arc<dyn RecordRepository>,
        migrations: Arc<dyn MigrationRepository>,
        tables: Vec<String>,
        chunk_size: u64,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::ConfigError(
                "Replication chunk size must be positive".to_string(),
            ));
        }

        Ok(Self {
            source,
            records,
            migrations,
            tables,
            chunk_size,
        })
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Refuse to replicate between different schema versions
    pub async fn check_compatibility(&self) -> Result<String> {
        let local = self.migrations.db_version().await?;
        let remote = self.source.db_version().await?;

        if local != remote {
            return Err(AppError::SchemaVersionMismatch { local, remote });
        }

        debug!(db_version = %local, "Replication source is compatible");
        Ok(local)
    }

    pub async fn sync_table(&self, table: &str) -> Result<TableReport> {
        let mut report = TableReport {
            table: table.to_string(),
            ..TableReport::default()
        };

        loop {
            let high_water_mark = self.high_water_mark(table).await?;
            let rows = self
                .source
                .fetch_table(table, high_water_mark, self.chunk_size)
                .await?;
            report.requests += 1;

            let fetched = rows.len() as u64;
            if fetched > 0 {
                let summary = self.records.bulk_upsert(table, &rows).await?;
                report.fetched += fetched;
                report.inserted += summary.inserted;
                report.updated += summary.updated;
                debug!(
                    table,
                    fetched,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    "Applied replication chunk"
                );
            }

            if fetched < self.chunk_size {
                break;
            }

            if self.high_water_mark(table).await? <= high_water_mark {
                warn!(
                    table,
                    high_water_mark = %high_water_mark,
                    "High-water mark did not advance after a full chunk, stopping table sync"
                );
                break;
            }
        }

        Ok(report)
    }

    /// Compatibility check, then every table in order.
    ///
    /// Tables synced before a failure keep their progress.
    pub async fn run(&self) -> Result<ReplicationReport> {
        let started_at = Utc::now();
        let db_version = self.check_compatibility().await?;

        let mut tables = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let report = self.sync_table(table).await?;
            info!(
                table = %table,
                fetched = report.fetched,
                inserted = report.inserted,
                updated = report.updated,
                "🔄 Table replicated"
            );
            tables.push(report);
        }

        Ok(ReplicationReport {
            db_version,
            tables,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn high_water_mark(&self, table: &str) -> Result<DateTime<Utc>> {
        Ok(self
            .records
            .max_updated_at(table)
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::SyncRecord;
    use crate::infrastructure::repositories::{
        InMemoryMigrationRepository, InMemoryRecordRepository,
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves rows from an in-memory table and records each request
    struct FakeSource {
        version: String,
        rows: Vec<SyncRecord>,
        requests: Mutex<Vec<(DateTime<Utc>, u64)>>,
    }

    #[async_trait]
    impl ReplicationSource for FakeSource {
        async fn db_version(&self) -> Result<String> {
            Ok(self.version.clone())
        }

        async fn fetch_table(
            &self,
            table: &str,
            updated_after: DateTime<Utc>,
            limit: u64,
        ) -> Result<Vec<SyncRecord>> {
            if table != "users" {
                return Err(AppError::UnknownTable(table.to_string()));
            }
            self.requests.lock().unwrap().push((updated_after, limit));
            Ok(self
                .rows
                .iter()
                .filter(|row| row.updated_at > updated_after)
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    fn source(rows: usize) -> Arc<FakeSource> {
        let base = Utc::now() - Duration::days(1);
        let rows = (0..rows)
            .map(|n| {
                let at = base + Duration::seconds(n as i64);
                SyncRecord::new(format!("user-{:03}", n), json!({ "n": n })).with_timestamps(at, at)
            })
            .collect();

        Arc::new(FakeSource {
            version: "0002_users".to_string(),
            rows,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn service(
        source: Arc<FakeSource>,
        records: Arc<InMemoryRecordRepository>,
        tables: &[&str],
    ) -> ReplicationService {
        ReplicationService::new(
            source,
            records,
            Arc::new(InMemoryMigrationRepository::with_applied(&[
                "0001_init.sql",
                "0002_users.sql",
            ])),
            tables.iter().map(|t| t.to_string()).collect(),
            10,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_pulls_in_chunks_from_high_water_mark() {
        let source = source(25);
        let records = Arc::new(InMemoryRecordRepository::new());
        let service = service(source.clone(), records.clone(), &["users"]);

        let report = service.sync_table("users").await.unwrap();

        assert_eq!(report.fetched, 25);
        assert_eq!(report.inserted, 25);
        assert_eq!(report.requests, 3);
        assert_eq!(records.count("users").await.unwrap(), 25);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[0].0, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(requests[1].0, source.rows[9].updated_at);
        assert!(requests.iter().all(|(_, limit)| *limit == 10));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let source = source(12);
        let records = Arc::new(InMemoryRecordRepository::new());
        let service = service(source, records.clone(), &["users"]);

        service.run().await.unwrap();
        let before = records.records("users").await;

        let report = service.run().await.unwrap();
        assert_eq!(report.rows_fetched(), 0);
        assert_eq!(report.tables[0].inserted, 0);
        assert_eq!(records.records("users").await, before);
    }

    #[tokio::test]
    async fn test_existing_rows_are_overwritten() {
        let source = source(3);
        let records = Arc::new(InMemoryRecordRepository::new());
        let stale = SyncRecord::new("user-001", json!({ "n": "local" }))
            .with_timestamps(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH);
        records.insert_records("users", vec![stale]).await;

        let report = service(source.clone(), records.clone(), &["users"])
            .sync_table("users")
            .await
            .unwrap();

        assert_eq!((report.inserted, report.updated), (2, 1));
        let rows = records.records("users").await;
        let row = rows.iter().find(|r| r.id == "user-001").unwrap();
        assert_eq!(row.data, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn test_version_mismatch_aborts_before_transfer() {
        let source = Arc::new(FakeSource {
            version: "0003_sessions".to_string(),
            rows: Vec::new(),
            requests: Mutex::new(Vec::new()),
        });
        let records = Arc::new(InMemoryRecordRepository::new());

        let result = service(source.clone(), records, &["users"]).run().await;

        match result {
            Err(AppError::SchemaVersionMismatch { local, remote }) => {
                assert_eq!(local, "0002_users");
                assert_eq!(remote, "0003_sessions");
            }
            other => panic!("expected version mismatch, got {:?}", other.map(|_| ())),
        }
        assert!(source.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_keeps_earlier_progress() {
        let source = source(5);
        let records = Arc::new(InMemoryRecordRepository::new());

        let result = service(source, records.clone(), &["users", "ghosts"]).run().await;

        assert!(matches!(result, Err(AppError::UnknownTable(t)) if t == "ghosts"));
        assert_eq!(records.count("users").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_stuck_high_water_mark_stops() {
        let at = Utc::now();
        let rows = (0..10)
            .map(|n| SyncRecord::new(format!("u{}", n), json!({})).with_timestamps(at, at))
            .collect();
        // ignores updated_after, so the mark never moves past `at`
        struct Stuck(Vec<SyncRecord>);

        #[async_trait]
        impl ReplicationSource for Stuck {
            async fn db_version(&self) -> Result<String> {
                Ok("0002_users".to_string())
            }

            async fn fetch_table(
                &self,
                _table: &str,
                _updated_after: DateTime<Utc>,
                _limit: u64,
            ) -> Result<Vec<SyncRecord>> {
                Ok(self.0.clone())
            }
        }

        let records = Arc::new(InMemoryRecordRepository::new());
        let service = ReplicationService::new(
            Arc::new(Stuck(rows)),
            records.clone(),
            Arc::new(InMemoryMigrationRepository::with_applied(&["0002_users.sql"])),
            vec!["users".to_string()],
            10,
        )
        .unwrap();

        let report = service.sync_table("users").await.unwrap();
        assert_eq!(report.requests, 2);
        assert_eq!(report.inserted, 10);
        assert_eq!(report.updated, 10);
    }
}
