use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::conditions::{ScalingCondition, SessionsCondition};
use super::evaluator::{AlertEvaluator, AlertOptions, EvaluationOutcome};
use super::notifier::Notifier;
use crate::config::AlertingConfig;
use crate::core::registry::LeadershipHandle;
use crate::domain::repositories::{InstanceRepository, RecordRepository};
use crate::error::{AppError, Result};

/// Runs every evaluator in sequence on a fixed interval.
///
/// The service owns its evaluators; once spawned they live inside a single
/// task, so their state needs no locking.
pub struct AlertingService {
    evaluators: Vec<AlertEvaluator>,
    notifier: Arc<dyn Notifier>,
    leadership: LeadershipHandle,
    always_evaluate: bool,
    check_interval: Duration,
    hostname: String,
}

impl AlertingService {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        leadership: LeadershipHandle,
        check_interval: Duration,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            evaluators: Vec::new(),
            notifier,
            leadership,
            always_evaluate: false,
            check_interval,
            hostname: hostname.into(),
        }
    }

    /// Scaling and sessions evaluators built from configuration.
    ///
    /// `stale_threshold` decides which registry rows still count as running.
    pub fn from_config(
        config: &AlertingConfig,
        stale_threshold: Duration,
        instances: Arc<dyn InstanceRepository>,
        records: Arc<dyn RecordRepository>,
        notifier: Arc<dyn Notifier>,
        leadership: LeadershipHandle,
        hostname: impl Into<String>,
    ) -> Result<Self> {
        let stale_threshold = ChronoDuration::from_std(stale_threshold).map_err(|e| {
            AppError::ConfigError(format!("Stale threshold out of range: {}", e))
        })?;
        let window = config.sessions.window().ok_or_else(|| {
            AppError::ConfigError(format!(
                "Sessions alert window of {} minutes is out of range",
                config.sessions.window_minutes
            ))
        })?;

        let scaling = AlertEvaluator::new(
            AlertOptions {
                name: "scaling".to_string(),
                cooldown: cooldown(config.scaling.cooldown_seconds),
                enabled: config.scaling.enabled,
                emoji: config.scaling.emoji.clone(),
            },
            Box::new(ScalingCondition::new(
                instances,
                stale_threshold,
                config.scaling.threshold,
            )),
        );

        let sessions = AlertEvaluator::new(
            AlertOptions {
                name: "sessions".to_string(),
                cooldown: cooldown(config.sessions.cooldown_seconds),
                enabled: config.sessions.enabled,
                emoji: config.sessions.emoji.clone(),
            },
            Box::new(SessionsCondition::new(
                records,
                config.sessions.table.clone(),
                window,
                config.sessions.threshold,
            )),
        );

        Ok(Self::new(
            notifier,
            leadership,
            Duration::from_secs(config.check_interval_seconds),
            hostname,
        )
        .with_evaluator(scaling)
        .with_evaluator(sessions))
    }

    pub fn with_evaluator(mut self, evaluator: AlertEvaluator) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Evaluate regardless of leadership, for local development
    pub fn always_evaluate(mut self, always: bool) -> Self {
        self.always_evaluate = always;
        self
    }

    pub fn evaluators(&self) -> &[AlertEvaluator] {
        &self.evaluators
    }

    /// One pass over every evaluator
    pub async fn run_once(&mut self) -> Vec<EvaluationOutcome> {
        let gate_open = self.always_evaluate || self.leadership.is_primary();
        if !gate_open {
            debug!("Not the primary instance, skipping alert checks");
        }

        let mut outcomes = Vec::with_capacity(self.evaluators.len());
        for evaluator in &mut self.evaluators {
            let outcome = evaluator
                .evaluate(gate_open, self.notifier.as_ref(), &self.hostname)
                .await;
            outcomes.push(outcome);
        }
        outcomes
    }

    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                evaluators = self.evaluators.len(),
                interval_seconds = self.check_interval.as_secs(),
                "🔔 Alerting service started"
            );

            let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }

            info!("Alerting service stopped");
        })
    }
}

fn cooldown(seconds: u64) -> ChronoDuration {
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    ChronoDuration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerting::AlertPayload;
    use crate::domain::entities::InstanceEntity;
    use crate::infrastructure::repositories::{
        InMemoryInstanceRepository, InMemoryRecordRepository,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<AlertPayload>>,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn notify(&self, payload: &AlertPayload) -> Result<()> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    async fn fleet(size: usize) -> Arc<InMemoryInstanceRepository> {
        let repo = Arc::new(InMemoryInstanceRepository::new());
        for n in 0..size {
            let instance = InstanceEntity::new(format!("10.0.0.{}", n), "api".to_string(), 8000);
            repo.register(&instance).await.unwrap();
        }
        repo
    }

    const STALE: Duration = Duration::from_secs(540);

    fn config(scaling_threshold: u64) -> AlertingConfig {
        let mut config = AlertingConfig::default();
        config.scaling.threshold = scaling_threshold;
        config
    }

    #[tokio::test]
    async fn test_follower_skips_all_evaluators() {
        let outbox = Arc::new(Outbox::default());
        let mut service = AlertingService::from_config(
            &config(1),
            STALE,
            fleet(3).await,
            Arc::new(InMemoryRecordRepository::new()),
            outbox.clone(),
            LeadershipHandle::fixed(false),
            "api-1",
        )
        .unwrap();

        let outcomes = service.run_once().await;
        assert_eq!(outcomes, vec![EvaluationOutcome::Skipped; 2]);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leader_fires_scaling_alert() {
        let outbox = Arc::new(Outbox::default());
        let mut service = AlertingService::from_config(
            &config(2),
            STALE,
            fleet(3).await,
            Arc::new(InMemoryRecordRepository::new()),
            outbox.clone(),
            LeadershipHandle::fixed(true),
            "api-1",
        )
        .unwrap();

        let outcomes = service.run_once().await;
        assert_eq!(
            outcomes,
            vec![EvaluationOutcome::Fired, EvaluationOutcome::Idle]
        );

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("3 instances are running"));
    }

    #[tokio::test]
    async fn test_development_mode_bypasses_leader_gate() {
        let outbox = Arc::new(Outbox::default());
        let mut alerting = config(2);
        alerting.sessions.enabled = false;

        let mut service = AlertingService::from_config(
            &alerting,
            STALE,
            fleet(3).await,
            Arc::new(InMemoryRecordRepository::new()),
            outbox.clone(),
            LeadershipHandle::fixed(false),
            "api-1",
        )
        .unwrap()
        .always_evaluate(true);

        let outcomes = service.run_once().await;
        assert_eq!(
            outcomes,
            vec![EvaluationOutcome::Fired, EvaluationOutcome::Skipped]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_window_is_config_error() {
        let mut alerting = config(2);
        alerting.sessions.window_minutes = i64::MAX / 2;

        let result = AlertingService::from_config(
            &alerting,
            STALE,
            fleet(0).await,
            Arc::new(InMemoryRecordRepository::new()),
            Arc::new(Outbox::default()),
            LeadershipHandle::fixed(true),
            "api-1",
        );
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
