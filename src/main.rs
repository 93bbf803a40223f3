use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fleetcore::{
    config::{AppConfiguration, ConfigManager},
    core::{
        alerting::AlertingService,
        logging::init_logging,
        registry::{local_hostname, InstanceRegistry},
        replication::{ReplicationScheduler, ReplicationService},
    },
    domain::repositories::{InstanceRepository, MigrationRepository, RecordRepository},
    infrastructure::{
        database::DatabaseManager,
        repositories::{MongoInstanceRepository, MongoMigrationRepository, MongoRecordRepository},
        HttpReplicationSource, WebhookNotifier,
    },
    presentation::create_app,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let mut config_manager = ConfigManager::new();
    config_manager
        .load()
        .await
        .context("Failed to load configuration")?;
    let config = Arc::new(config_manager.get().clone());

    init_logging(&config.observability.logging)?;
    info!(
        environment = %config.environment,
        config_file = ?config_manager.config_path(),
        "🚀 Starting fleetcore"
    );

    let db = DatabaseManager::new(&config.database.mongodb_uri, &config.database.database_name)
        .await
        .context("Failed to connect to MongoDB")?;
    let database = db.get_database();

    let instances: Arc<dyn InstanceRepository> =
        Arc::new(MongoInstanceRepository::new(database).await?);
    let records: Arc<dyn RecordRepository> =
        Arc::new(MongoRecordRepository::new(database, &indexed_tables(&config)).await?);
    let migrations: Arc<dyn MigrationRepository> =
        Arc::new(MongoMigrationRepository::new(database));

    let registry = Arc::new(InstanceRegistry::for_local_host(
        instances.clone(),
        &config.registry,
        config.server.port,
    ));
    registry.start().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    if config.alerting.enabled {
        match WebhookNotifier::new(
            config.alerting.webhook_url.as_deref(),
            Duration::from_secs(config.alerting.webhook_timeout_seconds),
        ) {
            Ok(notifier) => {
                let service = AlertingService::from_config(
                    &config.alerting,
                    config.registry.stale_threshold(),
                    instances.clone(),
                    records.clone(),
                    Arc::new(notifier),
                    registry.leadership(),
                    local_hostname(),
                )?
                .always_evaluate(config.environment.is_development());
                background.push(service.spawn(shutdown_rx.clone()));
            }
            Err(e) => warn!(error = %e, "Alerting disabled"),
        }
    }

    if config.replication.enabled {
        let source = HttpReplicationSource::from_config(&config.replication)?;
        let service = ReplicationService::new(
            Arc::new(source),
            records.clone(),
            migrations.clone(),
            config.replication.tables.clone(),
            config.replication.chunk_size,
        )?;
        let scheduler = ReplicationScheduler::new(
            service,
            registry.leadership(),
            Duration::from_secs(config.replication.interval_seconds),
        );
        background.push(scheduler.spawn(shutdown_rx.clone()));
    }

    let state = AppState {
        config: config.clone(),
        records,
        migrations,
        leadership: registry.leadership(),
        instance_id: registry.instance_id(),
    };
    let app = create_app(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(address = %address, instance_id = %registry.instance_id(), "🌐 HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background services");
    shutdown_tx.send_replace(true);
    for handle in background {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    registry.stop().await;

    info!("👋 Shutdown complete");
    Ok(())
}

/// Tables that need replication indexes, including the sessions alert table
fn indexed_tables(config: &AppConfiguration) -> Vec<String> {
    let mut tables = config.replication.tables.clone();
    if !tables.contains(&config.alerting.sessions.table) {
        tables.push(config.alerting.sessions.table.clone());
    }
    tables
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
