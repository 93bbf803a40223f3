use crate::{
    domain::{
        entities::{InstanceEntity, InstanceId},
        repositories::InstanceRepository,
    },
    error::{AppError, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::FindOptions,
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INSTANCES_COLLECTION: &str = "instances";

/// MongoDB document representation of an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDocument {
    #[serde(rename = "_id")]
    pub instance_id: String,
    pub is_primary: bool,
    pub ip_address: String,
    pub hostname: String,
    pub port: i32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl From<&InstanceEntity> for InstanceDocument {
    fn from(instance: &InstanceEntity) -> Self {
        Self {
            instance_id: instance.id.to_string(),
            is_primary: instance.is_primary,
            ip_address: instance.ip_address.clone(),
            hostname: instance.hostname.clone(),
            port: i32::from(instance.port),
            start_time: instance.start_time,
            last_heartbeat: instance.last_heartbeat,
            metadata: instance.metadata.clone(),
        }
    }
}

impl TryFrom<InstanceDocument> for InstanceEntity {
    type Error = AppError;

    fn try_from(doc: InstanceDocument) -> Result<Self> {
        let id = Uuid::parse_str(&doc.instance_id)
            .map_err(|e| AppError::DatabaseError(format!("Invalid instance ID: {}", e)))?;
        let port = u16::try_from(doc.port)
            .map_err(|e| AppError::DatabaseError(format!("Invalid instance port: {}", e)))?;

        Ok(InstanceEntity {
            id,
            is_primary: doc.is_primary,
            ip_address: doc.ip_address,
            hostname: doc.hostname,
            port,
            start_time: doc.start_time,
            last_heartbeat: doc.last_heartbeat,
            metadata: doc.metadata,
        })
    }
}

/// MongoDB implementation of the instance repository
pub struct MongoInstanceRepository {
    collection: Collection<InstanceDocument>,
}

impl MongoInstanceRepository {
    pub async fn new(database: &Database) -> Result<Self> {
        let collection = database.collection::<InstanceDocument>(INSTANCES_COLLECTION);

        let repo = Self { collection };
        repo.create_indexes().await?;

        Ok(repo)
    }

    async fn create_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "last_heartbeat": 1, "start_time": 1 })
                .build(),
            IndexModel::builder().keys(doc! { "start_time": 1 }).build(),
        ];

        self.collection
            .create_indexes(indexes, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for MongoInstanceRepository {
    async fn register(&self, instance: &InstanceEntity) -> Result<()> {
        self.collection
            .insert_one(InstanceDocument::from(instance), None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to register instance: {}", e)))?;

        Ok(())
    }

    async fn update_heartbeat(
        &self,
        id: InstanceId,
        at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<bool> {
        let metadata = bson::to_bson(&metadata)
            .map_err(|e| AppError::DatabaseError(format!("Invalid instance metadata: {}", e)))?;
        let filter = doc! { "_id": id.to_string() };
        let update = doc! {
            "$set": {
                "last_heartbeat": bson::DateTime::from_chrono(at),
                "metadata": metadata,
            }
        };

        let result = self
            .collection
            .update_one(filter, update, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update heartbeat: {}", e)))?;

        Ok(result.matched_count > 0)
    }

    async fn set_primary(&self, id: InstanceId, is_primary: bool) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { "is_primary": is_primary } };

        let result = self
            .collection
            .update_one(filter, update, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to set primary flag: {}", e)))?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!("Instance not found: {}", id)));
        }

        Ok(())
    }

    async fn find_live(&self, since: DateTime<Utc>) -> Result<Vec<InstanceEntity>> {
        let filter = doc! { "last_heartbeat": { "$gt": bson::DateTime::from_chrono(since) } };
        let options = FindOptions::builder()
            .sort(doc! { "start_time": 1 })
            .build();

        let documents: Vec<InstanceDocument> = self
            .collection
            .find(filter, options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list instances: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Cursor error: {}", e)))?;

        documents.into_iter().map(InstanceEntity::try_from).collect()
    }

    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64> {
        let filter = doc! { "last_heartbeat": { "$lt": bson::DateTime::from_chrono(before) } };

        let result = self
            .collection
            .delete_many(filter, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete stale instances: {}", e)))?;

        Ok(result.deleted_count)
    }

    async fn delete(&self, id: InstanceId) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };

        self.collection
            .delete_one(filter, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete instance: {}", e)))?;

        Ok(())
    }

    async fn count_live(&self, since: DateTime<Utc>) -> Result<u64> {
        let filter = doc! { "last_heartbeat": { "$gt": bson::DateTime::from_chrono(since) } };

        self.collection
            .count_documents(filter, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count instances: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_round_trip_keeps_identity() {
        let instance = InstanceEntity::new("10.1.2.3".to_string(), "api-2".to_string(), 8080)
            .with_metadata(serde_json::json!({ "version": "0.1.0" }));

        let document = InstanceDocument::from(&instance);
        assert_eq!(document.instance_id, instance.id.to_string());
        assert_eq!(document.port, 8080);

        let restored = InstanceEntity::try_from(document).unwrap();
        assert_eq!(restored, instance);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let instance = InstanceEntity::new("10.1.2.3".to_string(), "api-2".to_string(), 8080);
        let mut document = InstanceDocument::from(&instance);
        document.port = -1;

        assert!(matches!(
            InstanceEntity::try_from(document),
            Err(AppError::DatabaseError(_))
        ));
    }
}
