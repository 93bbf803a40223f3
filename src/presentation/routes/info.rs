use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{error::Result, AppState};

/// Version pair compared by replication peers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoResponse {
    pub version: String,
    pub db_version: String,
}

pub fn info_router() -> Router<AppState> {
    Router::new()
        .route("/info", get(get_info))
        .route("/api/healthchecker", get(health_checker))
}

async fn get_info(State(state): State<AppState>) -> Result<Json<InfoResponse>> {
    let db_version = state.migrations.db_version().await?;

    Ok(Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        db_version,
    }))
}

async fn health_checker(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "instance_id": state.instance_id,
        "is_primary": state.leadership.is_primary(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
