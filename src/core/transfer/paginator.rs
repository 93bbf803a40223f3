//! Offset-based chunked transfer
//!
//! Turns any "fetch `limit` rows starting at `offset`" query into a sequence
//! of bounded chunks handed to a [`PageSink`]. The next page is only fetched
//! after the sink has finished with the previous one, so a slow consumer
//! throttles the queries.
//!
//! Rows inserted between two page fetches can shift offsets, which may skip
//! or repeat rows within a single transfer.

use async_trait::async_trait;
use std::future::Future;
use tracing::debug;

use crate::error::{AppError, Result};

/// Consumer of a paginated transfer.
///
/// `on_start` and `on_end` are each called exactly once per successful run,
/// even when no chunk is produced.
#[async_trait]
pub trait PageSink<T: Send>: Send {
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_chunk(&mut self, rows: Vec<T>, offset: u64) -> Result<()>;

    async fn on_end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub chunks: u64,
    pub rows: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginatedTransfer {
    page_size: u64,
    limit: Option<u64>,
}

impl PaginatedTransfer {
    pub fn new(page_size: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(AppError::ValidationError(
                "Page size must be positive".to_string(),
            ));
        }

        Ok(Self {
            page_size,
            limit: None,
        })
    }

    /// Cap the total number of rows emitted
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    fn remaining(&self, emitted: u64) -> u64 {
        match self.limit {
            Some(limit) => self.page_size.min(limit.saturating_sub(emitted)),
            None => self.page_size,
        }
    }

    /// Drive `query(offset, limit)` until a short page or the overall limit.
    pub async fn run<T, Q, Fut, S>(&self, mut query: Q, sink: &mut S) -> Result<TransferSummary>
    where
        T: Send,
        Q: FnMut(u64, u64) -> Fut + Send,
        Fut: Future<Output = Result<Vec<T>>> + Send,
        S: PageSink<T> + ?Sized,
    {
        sink.on_start().await?;

        let mut summary = TransferSummary::default();
        let mut offset = 0u64;

        loop {
            let requested = self.remaining(summary.rows);
            if requested == 0 {
                break;
            }

            let mut rows = query(offset, requested).await?;
            rows.truncate(requested as usize);
            let fetched = rows.len() as u64;

            if fetched > 0 {
                debug!(offset, rows = fetched, "Emitting chunk");
                sink.on_chunk(rows, offset).await?;
                summary.chunks += 1;
                summary.rows += fetched;
            }

            if fetched < requested {
                break;
            }
            offset += self.page_size;
        }

        sink.on_end().await?;
        Ok(summary)
    }
}
