use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    error::{AppError, Result},
    AppState,
};

/// Bearer-token guard for the replication source endpoints.
///
/// Export is refused outright when no token is configured.
pub async fn require_export_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response> {
    let expected = state
        .config
        .replication
        .export_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            warn!("Replication export requested but no export token is configured");
            AppError::Forbidden("Replication export is disabled".to_string())
        })?;

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("Rejected replication request with an invalid token");
        return Err(AppError::AuthError("Invalid bearer token".to_string()));
    }

    debug!("Replication token verified");
    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
