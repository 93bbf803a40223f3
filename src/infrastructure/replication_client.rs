//! HTTP client for a remote replication source

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ReplicationConfig;
use crate::core::replication::ReplicationSource;
use crate::core::transfer::STREAM_ERROR_MARKER;
use crate::domain::entities::SyncRecord;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct InfoResponse {
    db_version: String,
}

pub struct HttpReplicationSource {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpReplicationSource {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        // a trailing slash keeps `join` from replacing the last path segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AppError::ConfigError(format!("Invalid replication source URL: {}", e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fleetcore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &ReplicationConfig) -> Result<Self> {
        let source_url = config.source_url.as_deref().ok_or_else(|| {
            AppError::ConfigError("Replication source URL is not configured".to_string())
        })?;

        Self::new(
            source_url,
            config.source_token.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::ConfigError(format!("Invalid replication endpoint {}: {}", path, e)))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request.send().await.map_err(AppError::from)
    }
}

fn status_error(status: StatusCode, table: Option<&str>) -> AppError {
    match (status, table) {
        (StatusCode::NOT_FOUND, Some(table)) => AppError::UnknownTable(table.to_string()),
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            AppError::ConfigError(format!("Replication source rejected credentials: HTTP {}", status))
        }
        _ => AppError::ExternalServiceError(format!("Replication source returned HTTP {}", status)),
    }
}

/// Parse an exported table body, surfacing a mid-stream failure marker
pub fn parse_table_body(body: &str) -> Result<Vec<SyncRecord>> {
    if let Some(position) = body.rfind(STREAM_ERROR_MARKER) {
        let message = body[position + STREAM_ERROR_MARKER.len()..].trim();
        return Err(AppError::ExternalServiceError(format!(
            "Replication source failed mid-stream: {}",
            message
        )));
    }

    serde_json::from_str(body).map_err(|e| {
        AppError::ExternalServiceError(format!("Malformed replication response: {}", e))
    })
}

#[async_trait]
impl ReplicationSource for HttpReplicationSource {
    async fn db_version(&self) -> Result<String> {
        let response = self.get(self.endpoint("info")?).await?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), None));
        }

        let info: InfoResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Malformed info response: {}", e))
        })?;
        Ok(info.db_version)
    }

    async fn fetch_table(
        &self,
        table: &str,
        updated_after: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SyncRecord>> {
        let mut url = self.endpoint(&format!(
            "replication/source/get-table/{}",
            urlencoding::encode(table)
        ))?;
        url.query_pairs_mut()
            .append_pair(
                "updated_after",
                &updated_after.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
            .append_pair("limit", &limit.to_string());

        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), Some(table)));
        }

        let body = response.text().await.map_err(AppError::from)?;
        let rows = parse_table_body(&body)?;
        debug!(table, rows = rows.len(), "Fetched rows from replication source");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let source =
            HttpReplicationSource::new("https://source.example.com/api", None, Duration::from_secs(5))
                .unwrap();
        let url = source.endpoint("info").unwrap();
        assert_eq!(url.as_str(), "https://source.example.com/api/info");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, Some("ghosts")),
            AppError::UnknownTable(t) if t == "ghosts"
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, Some("users")),
            AppError::ConfigError(_)
        ));
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, Some("users")).is_transient());
    }

    #[test]
    fn test_body_with_error_suffix_is_rejected() {
        let body = "[{\"id\":\"1\",\"created_at\":\"2024-01-01T00:00:00Z\",\"updated_at\":\"2024-01-01T00:00:00Z\",\"data\":{}}\nERROR: Database error: connection reset";
        match parse_table_body(body) {
            Err(AppError::ExternalServiceError(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected: {:?}", other),
        }

        assert_eq!(parse_table_body("[]").unwrap(), Vec::new());
    }

    #[test]
    fn test_missing_source_url_is_config_error() {
        let config = ReplicationConfig::default();
        assert!(matches!(
            HttpReplicationSource::from_config(&config),
            Err(AppError::ConfigError(_))
        ));
    }
}
