//! Source side of replication: streamed table export

use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, Path, Query, State},
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info};

use crate::{
    core::transfer::{JsonArraySink, PaginatedTransfer},
    error::{AppError, Result},
    presentation::middleware::require_export_token,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct GetTableQuery {
    pub updated_after: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

pub fn replication_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/replication/source/get-table/:table", get(get_table))
        .route_layer(middleware::from_fn_with_state(state, require_export_token))
}

/// Stream rows with `updated_at > updated_after` as one JSON array.
///
/// Pages are queried only as fast as the client reads them. Once the body
/// has started, a failure is reported as a plain-text suffix.
async fn get_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    query: std::result::Result<Query<GetTableQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if !state.config.replication.is_known_table(&table) {
        return Err(AppError::UnknownTable(table));
    }
    if query.limit == Some(0) {
        return Err(AppError::BadRequest("limit must be positive".to_string()));
    }

    let updated_after = query.updated_after.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let transfer = PaginatedTransfer::new(state.config.replication.export_page_size)?
        .with_limit(query.limit);

    info!(
        table = %table,
        updated_after = %updated_after,
        limit = ?query.limit,
        "📤 Exporting table"
    );

    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let records = state.records.clone();

    tokio::spawn(async move {
        let mut sink = JsonArraySink::new(tx);
        let result = transfer
            .run(
                |offset, limit| {
                    let records = records.clone();
                    let table = table.clone();
                    async move {
                        records
                            .find_page(&table, updated_after, offset, limit)
                            .await
                    }
                },
                &mut sink,
            )
            .await;

        match result {
            Ok(summary) => debug!(
                table = %table,
                chunks = summary.chunks,
                rows = summary.rows,
                "Export finished"
            ),
            Err(AppError::StreamClosed) => debug!(table = %table, "Client closed export stream"),
            Err(e) => {
                error!(table = %table, error = %e, "Export failed mid-stream");
                sink.write_error(&e).await;
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
