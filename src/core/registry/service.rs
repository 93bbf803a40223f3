use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::host_stats::{local_hostname, local_ip_address, HostStatsCollector};
use super::leadership::LeadershipHandle;
use crate::config::RegistryConfig;
use crate::domain::entities::{InstanceEntity, InstanceId};
use crate::domain::repositories::InstanceRepository;

/// State shared between the registry and its timer tasks
#[derive(Clone)]
struct RegistryWorker {
    instance: Arc<InstanceEntity>,
    instance_id: InstanceId,
    repository: Arc<dyn InstanceRepository>,
    stale_threshold: chrono::Duration,
    is_primary: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    stats: Arc<Mutex<HostStatsCollector>>,
}

impl RegistryWorker {
    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    async fn metadata(&self) -> serde_json::Value {
        let stats = self.stats.lock().await.collect();
        serde_json::to_value(stats).unwrap_or(serde_json::Value::Null)
    }

    /// Insert this instance's row with a fresh heartbeat. The original
    /// `start_time` is kept so the instance keeps its election seniority.
    async fn register(&self) -> bool {
        let mut row = InstanceEntity::clone(&self.instance);
        row.is_primary = self.is_primary.load(Ordering::SeqCst);
        row.last_heartbeat = Utc::now();
        row.metadata = self.metadata().await;

        match self.repository.register(&row).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "Failed to register instance"
                );
                false
            }
        }
    }

    async fn heartbeat(&self) {
        if self.stopping() {
            return;
        }

        let metadata = self.metadata().await;

        match self
            .repository
            .update_heartbeat(self.instance_id, Utc::now(), metadata)
            .await
        {
            Ok(true) => debug!(instance_id = %self.instance_id, "💓 Heartbeat sent"),
            Ok(false) => {
                warn!(
                    instance_id = %self.instance_id,
                    "Heartbeat found no registry row, registering again"
                );
                if !self.stopping() && self.register().await {
                    info!(instance_id = %self.instance_id, "Instance re-registered");
                }
            }
            Err(e) => error!(
                instance_id = %self.instance_id,
                error = %e,
                "Failed to send heartbeat"
            ),
        }
    }

    async fn check_primary(&self) {
        if self.stopping() {
            return;
        }

        let cutoff = Utc::now() - self.stale_threshold;
        let live = match self.repository.find_live(cutoff).await {
            Ok(live) => live,
            Err(e) => {
                error!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "Failed to read live instances"
                );
                return;
            }
        };

        if self.stopping() {
            return;
        }

        let Some(intended) = live.first() else {
            warn!(
                instance_id = %self.instance_id,
                "No live instances visible, skipping primary check"
            );
            return;
        };

        let should_lead = intended.id == self.instance_id;
        let is_primary = self.is_primary.load(Ordering::SeqCst);

        if should_lead && !is_primary {
            match self.repository.set_primary(self.instance_id, true).await {
                Ok(()) if !self.stopping() => {
                    self.is_primary.store(true, Ordering::SeqCst);
                    info!(
                        instance_id = %self.instance_id,
                        live_instances = live.len(),
                        "👑 Instance promoted to primary"
                    );
                }
                Ok(()) => {}
                Err(e) => error!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "Failed to claim primary role"
                ),
            }
        } else if !should_lead && is_primary {
            self.is_primary.store(false, Ordering::SeqCst);
            info!(
                instance_id = %self.instance_id,
                leader_id = %intended.id,
                "Instance demoted, an older instance is live"
            );
            if let Err(e) = self.repository.set_primary(self.instance_id, false).await {
                error!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "Failed to release primary role"
                );
            }
        }

        if self.is_primary.load(Ordering::SeqCst) {
            self.cleanup_stale().await;
        }
    }

    async fn cleanup_stale(&self) {
        if !self.is_primary.load(Ordering::SeqCst) {
            return;
        }

        let cutoff = Utc::now() - self.stale_threshold;
        match self.repository.delete_stale(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(
                instance_id = %self.instance_id,
                removed,
                "🧹 Removed stale instances"
            ),
            Err(e) => error!(
                instance_id = %self.instance_id,
                error = %e,
                "Failed to remove stale instances"
            ),
        }
    }
}

/// Registry membership and leader election for this process.
///
/// Store failures are logged and retried on the next tick; no method here
/// returns an error.
pub struct InstanceRegistry {
    instance: InstanceEntity,
    worker: RegistryWorker,
    heartbeat_interval: Duration,
    primary_check_interval: Duration,
    shutdown: watch::Sender<bool>,
    heartbeat_timer: RwLock<Option<JoinHandle<()>>>,
    primary_check_timer: RwLock<Option<JoinHandle<()>>>,
}

impl InstanceRegistry {
    pub fn new(
        instance: InstanceEntity,
        repository: Arc<dyn InstanceRepository>,
        config: &RegistryConfig,
    ) -> Self {
        let stale_threshold = chrono::Duration::from_std(config.stale_threshold())
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            worker: RegistryWorker {
                instance: Arc::new(instance.clone()),
                instance_id: instance.id,
                repository,
                stale_threshold,
                is_primary: Arc::new(AtomicBool::new(false)),
                stopping: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(Mutex::new(HostStatsCollector::new())),
            },
            instance,
            heartbeat_interval: config.heartbeat_interval(),
            primary_check_interval: config.primary_check_interval(),
            shutdown,
            heartbeat_timer: RwLock::new(None),
            primary_check_timer: RwLock::new(None),
        }
    }

    /// Registry entry for this host listening on `port`
    pub fn for_local_host(
        repository: Arc<dyn InstanceRepository>,
        config: &RegistryConfig,
        port: u16,
    ) -> Self {
        let ip_address = config
            .advertise_address
            .clone()
            .unwrap_or_else(|| local_ip_address().to_string());
        let instance = InstanceEntity::new(ip_address, local_hostname(), port);
        Self::new(instance, repository, config)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn instance(&self) -> &InstanceEntity {
        &self.instance
    }

    pub fn is_primary_instance(&self) -> bool {
        self.worker.is_primary.load(Ordering::SeqCst)
    }

    pub fn leadership(&self) -> LeadershipHandle {
        LeadershipHandle::new(self.worker.is_primary.clone())
    }

    /// Register this instance, schedule both timers and run a first
    /// primary check right away.
    pub async fn start(&self) {
        info!(
            instance_id = %self.instance.id,
            ip_address = %self.instance.ip_address,
            hostname = %self.instance.hostname,
            port = self.instance.port,
            "🚀 Registering instance"
        );

        // a failed insert is retried by the next heartbeat tick
        self.worker.register().await;

        self.start_heartbeat_timer().await;
        self.start_primary_check_timer().await;

        self.worker.check_primary().await;
    }

    /// Refresh this instance's heartbeat and host metadata, re-inserting the
    /// row when it is missing
    pub async fn heartbeat(&self) {
        self.worker.heartbeat().await;
    }

    /// Re-run the election against the current live set
    pub async fn check_primary(&self) {
        self.worker.check_primary().await;
    }

    /// Delete stale registrants; a no-op unless this instance is primary
    pub async fn cleanup_stale(&self) {
        self.worker.cleanup_stale().await;
    }

    /// Cancel both timers and remove this instance's row.
    ///
    /// A tick already running is allowed to finish, but its outcome no
    /// longer changes the leadership flag.
    pub async fn stop(&self) {
        info!(instance_id = %self.instance.id, "Stopping instance registry");

        self.worker.stopping.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        for timer in [&self.heartbeat_timer, &self.primary_check_timer] {
            if let Some(handle) = timer.write().await.take() {
                if let Err(e) = handle.await {
                    warn!(instance_id = %self.instance.id, error = %e, "Registry timer ended abnormally");
                }
            }
        }

        self.worker.is_primary.store(false, Ordering::SeqCst);

        if let Err(e) = self.worker.repository.delete(self.instance.id).await {
            error!(
                instance_id = %self.instance.id,
                error = %e,
                "Failed to deregister instance"
            );
        } else {
            info!(instance_id = %self.instance.id, "Instance deregistered");
        }
    }

    async fn start_heartbeat_timer(&self) {
        let worker = self.worker.clone();
        let handle = spawn_timer(self.heartbeat_interval, self.shutdown.subscribe(), move || {
            let worker = worker.clone();
            async move { worker.heartbeat().await }
        });

        if let Some(previous) = self.heartbeat_timer.write().await.replace(handle) {
            previous.abort();
        }
    }

    async fn start_primary_check_timer(&self) {
        let worker = self.worker.clone();
        let handle = spawn_timer(
            self.primary_check_interval,
            self.shutdown.subscribe(),
            move || {
                let worker = worker.clone();
                async move { worker.check_primary().await }
            },
        );

        if let Some(previous) = self.primary_check_timer.write().await.replace(handle) {
            previous.abort();
        }
    }
}

/// Run `tick` every `period`, starting one period from now, until shutdown.
fn spawn_timer<F, Fut>(
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => tick().await,
                _ = shutdown.changed() => break,
            }
        }
    })
}
