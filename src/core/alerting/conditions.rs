use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::evaluator::AlertCondition;
use super::payload::AlertMessage;
use crate::domain::repositories::{InstanceRepository, RecordRepository};
use crate::error::Result;

/// Live instance count against a fleet size ceiling.
///
/// Rows older than the stale threshold are left out even before the leader
/// reaps them.
pub struct ScalingCondition {
    instances: Arc<dyn InstanceRepository>,
    stale_threshold: Duration,
    threshold: u64,
}

impl ScalingCondition {
    pub fn new(
        instances: Arc<dyn InstanceRepository>,
        stale_threshold: Duration,
        threshold: u64,
    ) -> Self {
        Self {
            instances,
            stale_threshold,
            threshold,
        }
    }
}

#[async_trait]
impl AlertCondition for ScalingCondition {
    async fn current_value(&self) -> Result<u64> {
        let since = Utc::now() - self.stale_threshold;
        self.instances.count_live(since).await
    }

    fn threshold(&self) -> u64 {
        self.threshold
    }

    fn message(&self, value: u64) -> AlertMessage {
        AlertMessage {
            title: "Scaling alert".to_string(),
            body: format!(
                "{} instances are running, above the threshold of {}",
                value, self.threshold
            ),
        }
    }
}

/// Rows created in a trailing window of a session-like table
pub struct SessionsCondition {
    records: Arc<dyn RecordRepository>,
    table: String,
    window: Duration,
    threshold: u64,
}

impl SessionsCondition {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        table: impl Into<String>,
        window: Duration,
        threshold: u64,
    ) -> Self {
        Self {
            records,
            table: table.into(),
            window,
            threshold,
        }
    }
}

#[async_trait]
impl AlertCondition for SessionsCondition {
    async fn current_value(&self) -> Result<u64> {
        let since = Utc::now() - self.window;
        self.records.count_created_since(&self.table, since).await
    }

    fn threshold(&self) -> u64 {
        self.threshold
    }

    fn message(&self, value: u64) -> AlertMessage {
        AlertMessage {
            title: "Sessions alert".to_string(),
            body: format!(
                "{} {} were created in the last {} minutes, above the threshold of {}",
                value,
                self.table,
                self.window.num_minutes(),
                self.threshold
            ),
        }
    }
}
