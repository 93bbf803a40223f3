#![allow(dead_code)]

use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use fleetcore::{
    config::{AppConfiguration, RegistryConfig},
    core::registry::LeadershipHandle,
    domain::entities::{InstanceEntity, SyncRecord},
    infrastructure::repositories::{InMemoryMigrationRepository, InMemoryRecordRepository},
    AppState,
};

pub const EXPORT_TOKEN: &str = "s3cret-export-token";
pub const MIGRATIONS: &[&str] = &["0001_init.sql", "0002_users.sql"];

pub fn registry_config() -> RegistryConfig {
    RegistryConfig {
        heartbeat_interval_seconds: 180,
        ..RegistryConfig::default()
    }
}

pub fn instance_started_at(start_time: DateTime<Utc>, host: &str) -> InstanceEntity {
    InstanceEntity::new("10.0.0.1".to_string(), host.to_string(), 8000).with_start_time(start_time)
}

/// `count` user rows one second apart, oldest first
pub fn user_rows(count: usize) -> Vec<SyncRecord> {
    let base = Utc::now() - Duration::days(1);
    (0..count)
        .map(|n| {
            let at = base + Duration::seconds(n as i64);
            SyncRecord::new(format!("user-{:03}", n), json!({ "email": format!("u{}@example.com", n) }))
                .with_timestamps(at, at)
        })
        .collect()
}

pub fn source_config(export_token: Option<&str>) -> AppConfiguration {
    let mut config = AppConfiguration::default();
    config.replication.tables = vec!["users".to_string()];
    config.replication.export_page_size = 10;
    config.replication.export_token = export_token.map(str::to_string);
    config
}

pub struct SourceFixture {
    pub state: AppState,
    pub records: Arc<InMemoryRecordRepository>,
}

pub async fn source_fixture(rows: usize, export_token: Option<&str>) -> SourceFixture {
    let records = Arc::new(InMemoryRecordRepository::new());
    records.insert_records("users", user_rows(rows)).await;

    let state = AppState {
        config: Arc::new(source_config(export_token)),
        records: records.clone(),
        migrations: Arc::new(InMemoryMigrationRepository::with_applied(MIGRATIONS)),
        leadership: LeadershipHandle::fixed(true),
        instance_id: Uuid::new_v4(),
    };

    SourceFixture { state, records }
}

/// Serve `app` on an ephemeral loopback port
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}
