use mongodb::{
    bson::doc,
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use tracing::info;

use crate::error::AppError;

#[derive(Clone)]
pub struct DatabaseManager {
    pub client: Client,
    pub database: Database,
}

impl DatabaseManager {
    pub async fn new(mongodb_uri: &str, database_name: &str) -> Result<Self, AppError> {
        info!("🔄 Connecting to MongoDB...");

        let mut client_options = ClientOptions::parse(mongodb_uri)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse MongoDB URI: {}", e)))?;

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);
        client_options.app_name = Some("fleetcore".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            AppError::DatabaseError(format!("Failed to create MongoDB client: {}", e))
        })?;

        client
            .database("admin")
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to ping MongoDB: {}", e)))?;

        info!(database = database_name, "✅ Successfully connected to MongoDB!");

        let database = client.database(database_name);

        Ok(DatabaseManager { client, database })
    }

    pub fn get_database(&self) -> &Database {
        &self.database
    }
}
