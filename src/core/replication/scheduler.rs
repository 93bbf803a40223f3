use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::service::ReplicationService;
use crate::core::registry::LeadershipHandle;

/// Periodic replication runs on the elected leader.
///
/// Transient failures wait for the next tick. Anything else, such as a
/// schema mismatch or an unknown table, stops the scheduler.
pub struct ReplicationScheduler {
    service: ReplicationService,
    leadership: LeadershipHandle,
    interval: Duration,
}

impl ReplicationScheduler {
    pub fn new(service: ReplicationService, leadership: LeadershipHandle, interval: Duration) -> Self {
        Self {
            service,
            leadership,
            interval,
        }
    }

    /// Run once if this instance leads; `false` when the scheduler must stop
    pub async fn tick(&self) -> bool {
        if !self.leadership.is_primary() {
            debug!("Not the primary instance, skipping replication");
            return true;
        }

        match self.service.run().await {
            Ok(report) => {
                info!(
                    db_version = %report.db_version,
                    tables = report.tables.len(),
                    rows = report.rows_fetched(),
                    "✅ Replication run completed"
                );
                true
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Replication run failed, retrying next interval");
                true
            }
            Err(e) => {
                error!(error = %e, "❌ Replication stopped");
                false
            }
        }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                tables = ?self.service.tables(),
                interval_seconds = self.interval.as_secs(),
                "Replication scheduler started"
            );

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !self.tick().await {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            info!("Replication scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::replication::ReplicationSource;
    use crate::domain::entities::SyncRecord;
    use crate::error::{AppError, Result};
    use crate::infrastructure::repositories::{
        InMemoryMigrationRepository, InMemoryRecordRepository,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    struct Failing(fn() -> AppError);

    #[async_trait]
    impl ReplicationSource for Failing {
        async fn db_version(&self) -> Result<String> {
            Err((self.0)())
        }

        async fn fetch_table(&self, _: &str, _: DateTime<Utc>, _: u64) -> Result<Vec<SyncRecord>> {
            Err((self.0)())
        }
    }

    fn scheduler(error: fn() -> AppError, leader: bool) -> ReplicationScheduler {
        let service = ReplicationService::new(
            Arc::new(Failing(error)),
            Arc::new(InMemoryRecordRepository::new()),
            Arc::new(InMemoryMigrationRepository::new()),
            vec!["users".to_string()],
            100,
        )
        .unwrap();
        ReplicationScheduler::new(service, LeadershipHandle::fixed(leader), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_transient_error_keeps_scheduler() {
        let scheduler = scheduler(|| AppError::SourceUnreachable("refused".to_string()), true);
        assert!(scheduler.tick().await);
    }

    #[tokio::test]
    async fn test_configuration_error_stops_scheduler() {
        let scheduler = scheduler(|| AppError::UnknownTable("users".to_string()), true);
        assert!(!scheduler.tick().await);
    }

    #[tokio::test]
    async fn test_follower_does_not_replicate() {
        let scheduler = scheduler(|| AppError::UnknownTable("users".to_string()), false);
        assert!(scheduler.tick().await);
    }
}
