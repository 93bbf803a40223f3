//! JSON array envelope over a bounded byte channel

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use super::paginator::PageSink;
use crate::error::{AppError, Result};

/// Written after a partial body when the transfer fails mid-stream
pub const STREAM_ERROR_MARKER: &str = "\nERROR: ";

/// Writes rows as one JSON array, a chunk per channel message.
///
/// Sending blocks while the channel is full, so a slow reader holds back the
/// next page query.
pub struct JsonArraySink {
    tx: mpsc::Sender<Bytes>,
    wrote_row: bool,
}

impl JsonArraySink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            wrote_row: false,
        }
    }

    /// Best-effort plain-text error suffix; the body is no longer valid JSON
    pub async fn write_error(&self, error: &AppError) {
        let suffix = format!("{}{}", STREAM_ERROR_MARKER, error);
        let _ = self.tx.send(Bytes::from(suffix)).await;
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.tx
            .send(Bytes::from(bytes))
            .await
            .map_err(|_| AppError::StreamClosed)
    }
}

#[async_trait]
impl<T> PageSink<T> for JsonArraySink
where
    T: Serialize + Send + 'static,
{
    async fn on_start(&mut self) -> Result<()> {
        self.send(b"[".to_vec()).await
    }

    async fn on_chunk(&mut self, rows: Vec<T>, _offset: u64) -> Result<()> {
        let mut buffer = Vec::new();
        for row in &rows {
            if self.wrote_row {
                buffer.push(b',');
            }
            serde_json::to_writer(&mut buffer, row)?;
            self.wrote_row = true;
        }
        self.send(buffer).await
    }

    async fn on_end(&mut self) -> Result<()> {
        self.send(b"]".to_vec()).await
    }
}
