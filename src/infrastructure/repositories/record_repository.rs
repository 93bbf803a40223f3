use crate::{
    domain::{
        entities::{SyncRecord, UpsertSummary},
        repositories::RecordRepository,
    },
    error::{AppError, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::{FindOneOptions, FindOptions, ReplaceOptions},
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// MongoDB document representation of a replicated row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl From<&SyncRecord> for RecordDocument {
    fn from(record: &SyncRecord) -> Self {
        Self {
            id: record.id.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            data: record.data.clone(),
        }
    }
}

impl From<RecordDocument> for SyncRecord {
    fn from(doc: RecordDocument) -> Self {
        SyncRecord {
            id: doc.id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            data: doc.data,
        }
    }
}

/// MongoDB implementation of the replicated-table repository.
/// Each table maps to a collection of the same name.
pub struct MongoRecordRepository {
    database: Database,
}

impl MongoRecordRepository {
    pub async fn new(database: &Database, tables: &[String]) -> Result<Self> {
        let repo = Self {
            database: database.clone(),
        };

        for table in tables {
            repo.create_indexes(table).await?;
        }

        Ok(repo)
    }

    fn collection(&self, table: &str) -> Collection<RecordDocument> {
        self.database.collection::<RecordDocument>(table)
    }

    async fn create_indexes(&self, table: &str) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "updated_at": 1, "_id": 1 })
                .build(),
            IndexModel::builder().keys(doc! { "created_at": 1 }).build(),
        ];

        self.collection(table)
            .create_indexes(indexes, None)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to create indexes on {}: {}", table, e))
            })?;

        Ok(())
    }
}

#[async_trait]
impl RecordRepository for MongoRecordRepository {
    async fn find_page(
        &self,
        table: &str,
        updated_after: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SyncRecord>> {
        let filter = doc! { "updated_at": { "$gt": bson::DateTime::from_chrono(updated_after) } };
        let limit = i64::try_from(limit)
            .map_err(|_| AppError::BadRequest(format!("Page size too large: {}", limit)))?;
        let options = FindOptions::builder()
            .sort(doc! { "updated_at": 1, "_id": 1 })
            .skip(offset)
            .limit(limit)
            .build();

        let documents: Vec<RecordDocument> = self
            .collection(table)
            .find(filter, options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read {}: {}", table, e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Cursor error: {}", e)))?;

        debug!(table, offset, rows = documents.len(), "Fetched page");
        Ok(documents.into_iter().map(SyncRecord::from).collect())
    }

    async fn max_updated_at(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "updated_at": -1 })
            .build();

        let latest = self
            .collection(table)
            .find_one(doc! {}, options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read high-water mark of {}: {}", table, e))
            })?;

        Ok(latest.map(|doc| doc.updated_at))
    }

    async fn bulk_upsert(&self, table: &str, records: &[SyncRecord]) -> Result<UpsertSummary> {
        let collection = self.collection(table);
        let mut summary = UpsertSummary::default();

        for record in records {
            let options = ReplaceOptions::builder().upsert(true).build();
            let result = collection
                .replace_one(
                    doc! { "_id": record.id.as_str() },
                    RecordDocument::from(record),
                    options,
                )
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to upsert into {}: {}", table, e))
                })?;

            if result.upserted_id.is_some() {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        Ok(summary)
    }

    async fn count_created_since(&self, table: &str, since: DateTime<Utc>) -> Result<u64> {
        let filter = doc! { "created_at": { "$gte": bson::DateTime::from_chrono(since) } };

        self.collection(table)
            .count_documents(filter, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count {}: {}", table, e)))
    }

    async fn count(&self, table: &str) -> Result<u64> {
        self.collection(table)
            .count_documents(doc! {}, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count {}: {}", table, e)))
    }
}
