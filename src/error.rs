use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Replication source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Schema version mismatch: local {local}, remote {remote}")]
    SchemaVersionMismatch { local: String, remote: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Stream closed by consumer")]
    StreamClosed,
}

impl AppError {
    /// Errors that a later timer tick can be expected to recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_)
                | AppError::SourceUnreachable(_)
                | AppError::ExternalServiceError(_)
                | AppError::StreamClosed
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ConfigError(format!("YAML error: {}", err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AppError::SourceUnreachable(err.to_string())
        } else {
            AppError::ExternalServiceError(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::SourceUnreachable(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::SchemaVersionMismatch { local, remote } => (
                StatusCode::CONFLICT,
                format!("Schema version mismatch: local {}, remote {}", local, remote),
            ),
            AppError::UnknownTable(table) => {
                (StatusCode::NOT_FOUND, format!("Unknown table: {}", table))
            }
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::StreamClosed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Stream closed".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::UnknownTable("ghosts".to_string()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("limit".to_string()), StatusCode::BAD_REQUEST),
            (AppError::AuthError("token".to_string()), StatusCode::UNAUTHORIZED),
            (
                AppError::SchemaVersionMismatch {
                    local: "a".to_string(),
                    remote: "b".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AppError::SourceUnreachable("down".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::DatabaseError("timeout".to_string()).is_transient());
        assert!(AppError::SourceUnreachable("refused".to_string()).is_transient());
        assert!(!AppError::UnknownTable("ghosts".to_string()).is_transient());
        assert!(!AppError::SchemaVersionMismatch {
            local: "1".to_string(),
            remote: "2".to_string()
        }
        .is_transient());
    }
}
