//! Fleetcore - coordination and replication core for a horizontally scaled API
//!
//! Lets several stateless server processes share one database: a registry
//! with timestamp-based leader election, bounded-memory paginated export,
//! pull-based replication between deployments and leader-gated threshold
//! alerting.

use std::sync::Arc;

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

pub use error::{AppError, Result};

use crate::core::registry::LeadershipHandle;
use crate::domain::entities::InstanceId;
use crate::domain::repositories::{MigrationRepository, RecordRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfiguration>,
    pub records: Arc<dyn RecordRepository>,
    pub migrations: Arc<dyn MigrationRepository>,
    pub leadership: LeadershipHandle,
    pub instance_id: InstanceId,
}
