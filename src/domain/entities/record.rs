//! Replicated table rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of a replicated table.
///
/// `id` is the primary key, `updated_at` drives the replication high-water
/// mark and `data` carries every other column untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SyncRecord {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            data,
        }
    }

    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }
}

/// Outcome of a bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: u64,
    pub updated: u64,
}
