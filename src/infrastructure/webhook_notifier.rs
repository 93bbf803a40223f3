use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::core::alerting::{AlertPayload, Notifier};
use crate::error::{AppError, Result};

/// Posts alert payloads to a chat webhook
pub struct WebhookNotifier {
    client: Client,
    url: url::Url,
}

impl WebhookNotifier {
    pub fn new(url: Option<&str>, timeout: Duration) -> Result<Self> {
        let url = url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Alert webhook URL is not configured".to_string()))?;
        let url = url::Url::parse(url)
            .map_err(|e| AppError::ConfigError(format!("Invalid alert webhook URL: {}", e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fleetcore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &AlertPayload) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Webhook returned HTTP {}",
                status
            )));
        }

        debug!(status = status.as_u16(), "Alert delivered");
        Ok(())
    }
}
