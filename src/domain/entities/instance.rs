//! Instance registry entities
//!
//! One `InstanceEntity` exists per running server process. The row is created
//! on startup, refreshed by its owner's heartbeat and removed either on
//! graceful shutdown or by the elected leader once it goes stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a registered instance
pub type InstanceId = Uuid;

/// Registry row describing one live server process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceEntity {
    /// Generated at registration, never reused
    pub id: InstanceId,
    /// Authoritative leadership flag as last written by the owner
    pub is_primary: bool,
    pub ip_address: String,
    pub hostname: String,
    pub port: u16,
    /// Immutable; the election tie-break key
    pub start_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Opaque host statistics, see `HostStats`
    pub metadata: serde_json::Value,
}

impl InstanceEntity {
    pub fn new(ip_address: String, hostname: String, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            is_primary: false,
            ip_address,
            hostname,
            port,
            start_time: now,
            last_heartbeat: now,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_last_heartbeat(mut self, last_heartbeat: DateTime<Utc>) -> Self {
        self.last_heartbeat = last_heartbeat;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when the heartbeat is at or before `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_heartbeat <= cutoff
    }
}

/// Host statistics stored in `InstanceEntity::metadata`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HostStats {
    pub version: String,
    pub hostname: Option<String>,
    pub cpu_count: usize,
    pub cpu_usage_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub load_average_one: f64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_instance_is_follower() {
        let instance = InstanceEntity::new("10.0.0.1".to_string(), "api-1".to_string(), 8000);
        assert!(!instance.is_primary);
        assert_eq!(instance.start_time, instance.last_heartbeat);
    }

    #[test]
    fn test_staleness_cutoff() {
        let now = Utc::now();
        let instance = InstanceEntity::new("10.0.0.1".to_string(), "api-1".to_string(), 8000)
            .with_last_heartbeat(now - Duration::minutes(10));

        assert!(instance.is_stale(now - Duration::minutes(9)));
        assert!(!instance.is_stale(now - Duration::minutes(11)));
    }
}
