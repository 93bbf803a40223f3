//! Per-alert state machine
//!
//! `idle -> firing` when the metric exceeds its threshold and the cooldown
//! has elapsed. While firing, the bar is raised to the last observed value,
//! so only a new peak can re-alert. Dropping back under the bar returns the
//! evaluator to idle without a notification.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::notifier::Notifier;
use super::payload::{AlertMessage, AlertPayload};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AlertOptions {
    pub name: String,
    pub cooldown: Duration,
    pub enabled: bool,
    pub emoji: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub is_firing: bool,
    pub last_value: Option<u64>,
}

/// A metric compared against a fixed threshold
#[async_trait]
pub trait AlertCondition: Send + Sync {
    async fn current_value(&self) -> Result<u64>;

    fn threshold(&self) -> u64;

    fn message(&self, value: u64) -> AlertMessage;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Disabled, or gated off by leadership
    Skipped,
    /// Metric could not be read; state untouched
    Failed,
    Idle,
    /// Notification attempted
    Fired,
    /// Above the bar but still inside the cooldown
    Suppressed,
    /// `firing -> idle`
    Resolved,
}

pub struct AlertEvaluator {
    options: AlertOptions,
    state: AlertState,
    condition: Box<dyn AlertCondition>,
}

impl AlertEvaluator {
    pub fn new(options: AlertOptions, condition: Box<dyn AlertCondition>) -> Self {
        Self {
            options,
            state: AlertState::default(),
            condition,
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &AlertOptions {
        &self.options
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Threshold in force for the next comparison
    pub fn effective_threshold(&self) -> u64 {
        let threshold = self.condition.threshold();
        match (self.state.is_firing, self.state.last_value) {
            (true, Some(last)) => threshold.max(last),
            _ => threshold,
        }
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.state
            .last_alert_sent
            .map_or(true, |sent| now - sent >= self.options.cooldown)
    }

    pub async fn evaluate(
        &mut self,
        gate_open: bool,
        notifier: &dyn Notifier,
        hostname: &str,
    ) -> EvaluationOutcome {
        self.evaluate_at(Utc::now(), gate_open, notifier, hostname)
            .await
    }

    pub async fn evaluate_at(
        &mut self,
        now: DateTime<Utc>,
        gate_open: bool,
        notifier: &dyn Notifier,
        hostname: &str,
    ) -> EvaluationOutcome {
        if !self.options.enabled || !gate_open {
            return EvaluationOutcome::Skipped;
        }

        let value = match self.condition.current_value().await {
            Ok(value) => value,
            Err(e) => {
                warn!(alert = %self.options.name, error = %e, "Failed to read alert metric");
                return EvaluationOutcome::Failed;
            }
        };

        let bar = self.effective_threshold();
        self.state.last_value = Some(value);

        if value <= bar {
            if self.state.is_firing {
                self.state.is_firing = false;
                info!(alert = %self.options.name, value, threshold = bar, "Alert resolved");
                return EvaluationOutcome::Resolved;
            }
            return EvaluationOutcome::Idle;
        }

        if !self.cooldown_elapsed(now) {
            debug!(alert = %self.options.name, value, "Alert suppressed by cooldown");
            return EvaluationOutcome::Suppressed;
        }

        info!(alert = %self.options.name, value, threshold = bar, "🚨 Alert firing");
        let payload = AlertPayload::build(
            &self.condition.message(value),
            &self.options.emoji,
            hostname,
            now,
        );
        if let Err(e) = notifier.notify(&payload).await {
            warn!(alert = %self.options.name, error = %e, "Failed to deliver alert");
        }

        self.state.last_alert_sent = Some(now);
        self.state.is_firing = true;
        EvaluationOutcome::Fired
    }
}
