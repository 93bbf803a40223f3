use crate::{
    domain::repositories::MigrationRepository,
    error::{AppError, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::FindOneOptions,
    Collection, Database,
};
use serde::{Deserialize, Serialize};

pub const MIGRATIONS_COLLECTION: &str = "migrations";

/// Applied-migration log entry written by the schema tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationDocument {
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub applied_at: DateTime<Utc>,
}

pub struct MongoMigrationRepository {
    collection: Collection<MigrationDocument>,
}

impl MongoMigrationRepository {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection::<MigrationDocument>(MIGRATIONS_COLLECTION),
        }
    }
}

#[async_trait]
impl MigrationRepository for MongoMigrationRepository {
    async fn latest_migration(&self) -> Result<Option<String>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "applied_at": -1, "name": -1 })
            .build();

        let latest = self
            .collection
            .find_one(doc! {}, options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read migrations: {}", e)))?;

        Ok(latest.map(|migration| migration.name))
    }
}
