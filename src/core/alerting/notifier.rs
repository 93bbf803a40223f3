use async_trait::async_trait;

use super::payload::AlertPayload;
use crate::error::Result;

/// Outbound channel for alert notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &AlertPayload) -> Result<()>;
}
