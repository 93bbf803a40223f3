use crate::config::Environment;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for every timer period, one week
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfiguration {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub environment: Environment,
    pub registry: RegistryConfig,
    pub alerting: AlertingConfig,
    pub replication: ReplicationConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub mongodb_uri: String,
    pub database_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            database_name: "fleetcore".to_string(),
        }
    }
}

/// Instance registry timing. The primary check runs every two heartbeats and
/// an instance is stale after three missed heartbeats unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub heartbeat_interval_seconds: u64,
    pub stale_threshold_seconds: Option<u64>,
    pub advertise_address: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 180,
            stale_threshold_seconds: None,
            advertise_address: None,
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn primary_check_interval(&self) -> Duration {
        self.heartbeat_interval().saturating_mul(2)
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.heartbeat_interval().saturating_mul(3))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,
    pub webhook_url: Option<String>,
    pub webhook_timeout_seconds: u64,
    pub scaling: ScalingAlertConfig,
    pub sessions: SessionsAlertConfig,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 60,
            webhook_url: None,
            webhook_timeout_seconds: 10,
            scaling: ScalingAlertConfig::default(),
            sessions: SessionsAlertConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingAlertConfig {
    pub enabled: bool,
    pub threshold: u64,
    pub cooldown_seconds: u64,
    pub emoji: String,
}

impl Default for ScalingAlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 10,
            cooldown_seconds: 3600,
            emoji: ":chart_with_upwards_trend:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsAlertConfig {
    pub enabled: bool,
    pub threshold: u64,
    pub window_minutes: i64,
    pub table: String,
    pub cooldown_seconds: u64,
    pub emoji: String,
}

impl SessionsAlertConfig {
    /// Trailing window, or `None` when the minutes do not fit a duration
    pub fn window(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_minutes(self.window_minutes)
    }
}

impl Default for SessionsAlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1000,
            window_minutes: 60,
            table: "sessions".to_string(),
            cooldown_seconds: 3600,
            emoji: ":busts_in_silhouette:".to_string(),
        }
    }
}

/// Replication settings. `source_*` fields configure this deployment as a
/// destination; `export_token` guards the source-side endpoints it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub enabled: bool,
    pub source_url: Option<String>,
    pub source_token: Option<String>,
    pub export_token: Option<String>,
    pub tables: Vec<String>,
    pub chunk_size: u64,
    pub export_page_size: u64,
    pub interval_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_url: None,
            source_token: None,
            export_token: None,
            tables: vec![
                "users".to_string(),
                "projects".to_string(),
                "sessions".to_string(),
            ],
            chunk_size: 1000,
            export_page_size: 500,
            interval_seconds: 300,
            request_timeout_seconds: 60,
        }
    }
}

impl ReplicationConfig {
    pub fn is_known_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "pretty" or "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Loads configuration from defaults, an optional file and the environment.
#[derive(Default)]
pub struct ConfigManager {
    config: AppConfiguration,
    config_path: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration: defaults, then `CONFIG_FILE`, then environment variables
    pub async fn load(&mut self) -> Result<()> {
        let mut config = AppConfiguration::default();

        if let Ok(config_path) = std::env::var("CONFIG_FILE") {
            config = Self::load_from_file(&config_path).await?;
            self.config_path = Some(config_path);
        }

        Self::load_from_env(&mut config)?;
        Self::validate_config(&config)?;

        self.config = config;
        info!(
            environment = %self.config.environment,
            "📋 Configuration loaded successfully"
        );
        Ok(())
    }

    /// Load configuration from environment variables
    fn load_from_env(config: &mut AppConfiguration) -> Result<()> {
        // Server configuration
        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = parse_env("PORT", &port)?;
        }

        // Database configuration
        if let Ok(uri) = std::env::var("MONGODB_URI") {
            config.database.mongodb_uri = uri;
        }
        if let Ok(db_name) = std::env::var("MONGODB_DATABASE") {
            config.database.database_name = db_name;
        }

        if let Ok(env) = std::env::var("APP_ENV") {
            config.environment = Environment::from_string(&env);
        }

        // Registry
        if let Ok(heartbeat) = std::env::var("HEARTBEAT_INTERVAL_SECONDS") {
            config.registry.heartbeat_interval_seconds =
                parse_env("HEARTBEAT_INTERVAL_SECONDS", &heartbeat)?;
        }
        if let Ok(stale) = std::env::var("STALE_THRESHOLD_SECONDS") {
            config.registry.stale_threshold_seconds =
                Some(parse_env("STALE_THRESHOLD_SECONDS", &stale)?);
        }
        if let Ok(address) = std::env::var("INSTANCE_ADDRESS") {
            config.registry.advertise_address = Some(address);
        }

        // Alerting
        if let Ok(url) = std::env::var("ALERT_WEBHOOK_URL") {
            config.alerting.webhook_url = Some(url);
        }
        if let Ok(enabled) = std::env::var("ALERTS_ENABLED") {
            config.alerting.enabled = parse_env("ALERTS_ENABLED", &enabled)?;
        }
        if let Ok(threshold) = std::env::var("SCALING_ALERT_THRESHOLD") {
            config.alerting.scaling.threshold = parse_env("SCALING_ALERT_THRESHOLD", &threshold)?;
        }
        if let Ok(threshold) = std::env::var("SESSIONS_ALERT_THRESHOLD") {
            config.alerting.sessions.threshold =
                parse_env("SESSIONS_ALERT_THRESHOLD", &threshold)?;
        }

        // Replication
        if let Ok(enabled) = std::env::var("REPLICATION_ENABLED") {
            config.replication.enabled = parse_env("REPLICATION_ENABLED", &enabled)?;
        }
        if let Ok(url) = std::env::var("REPLICATION_SOURCE_URL") {
            config.replication.source_url = Some(url);
        }
        if let Ok(token) = std::env::var("REPLICATION_SOURCE_TOKEN") {
            config.replication.source_token = Some(token);
        }
        if let Ok(token) = std::env::var("REPLICATION_EXPORT_TOKEN") {
            config.replication.export_token = Some(token);
        }
        if let Ok(tables) = std::env::var("REPLICATION_TABLES") {
            config.replication.tables = tables
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(chunk) = std::env::var("REPLICATION_CHUNK_SIZE") {
            config.replication.chunk_size = parse_env("REPLICATION_CHUNK_SIZE", &chunk)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.observability.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.observability.logging.format = format;
        }

        debug!("🔧 Configuration loaded from environment variables");
        Ok(())
    }

    /// Load configuration from file
    async fn load_from_file(path: &str) -> Result<AppConfiguration> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;

        let file_config: AppConfiguration = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| AppError::ConfigError(format!("Invalid YAML config: {}", e)))?
        } else if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| AppError::ConfigError(format!("Invalid JSON config: {}", e)))?
        } else {
            return Err(AppError::ConfigError(
                "Config file must be .yaml, .yml, or .json".to_string(),
            ));
        };

        debug!(path = path, "📁 Configuration loaded from file");
        Ok(file_config)
    }

    /// Validate configuration
    pub fn validate_config(config: &AppConfiguration) -> Result<()> {
        if config.database.mongodb_uri.is_empty() {
            return Err(AppError::ConfigError("MongoDB URI is required".to_string()));
        }

        if config.server.port == 0 {
            return Err(AppError::ConfigError("Invalid server port".to_string()));
        }

        let registry = &config.registry;
        if registry.heartbeat_interval_seconds == 0 {
            return Err(AppError::ConfigError(
                "Heartbeat interval must be positive".to_string(),
            ));
        }
        let stale_threshold = match registry.stale_threshold_seconds {
            Some(seconds) => Some(seconds),
            None => registry.heartbeat_interval_seconds.checked_mul(3),
        };
        let primary_check = registry.heartbeat_interval_seconds.checked_mul(2);
        match (stale_threshold, primary_check) {
            (Some(stale), Some(check)) if stale.max(check) <= MAX_INTERVAL_SECONDS => {}
            _ => {
                return Err(AppError::ConfigError(format!(
                    "Registry intervals must not exceed {} seconds",
                    MAX_INTERVAL_SECONDS
                )))
            }
        }
        if registry.stale_threshold() <= registry.heartbeat_interval() {
            return Err(AppError::ConfigError(
                "Stale threshold must exceed the heartbeat interval".to_string(),
            ));
        }

        let alerting = &config.alerting;
        if alerting.check_interval_seconds == 0
            || alerting.check_interval_seconds > MAX_INTERVAL_SECONDS
        {
            return Err(AppError::ConfigError(format!(
                "Alert check interval must be between 1 and {} seconds",
                MAX_INTERVAL_SECONDS
            )));
        }
        if alerting.sessions.window_minutes <= 0 || alerting.sessions.window().is_none() {
            return Err(AppError::ConfigError(
                "Sessions alert window must be a positive number of minutes".to_string(),
            ));
        }

        let replication = &config.replication;
        if replication.chunk_size == 0 || replication.export_page_size == 0 {
            return Err(AppError::ConfigError(
                "Replication chunk and page sizes must be positive".to_string(),
            ));
        }
        if replication.interval_seconds == 0 || replication.interval_seconds > MAX_INTERVAL_SECONDS
        {
            return Err(AppError::ConfigError(format!(
                "Replication interval must be between 1 and {} seconds",
                MAX_INTERVAL_SECONDS
            )));
        }
        if replication.enabled {
            let source = replication.source_url.as_deref().ok_or_else(|| {
                AppError::ConfigError("Replication enabled without a source URL".to_string())
            })?;
            url::Url::parse(source).map_err(|e| {
                AppError::ConfigError(format!("Invalid replication source URL: {}", e))
            })?;
            if replication.tables.is_empty() {
                return Err(AppError::ConfigError(
                    "Replication enabled without any tables".to_string(),
                ));
            }
        }

        match config.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(AppError::ConfigError("Invalid log level".to_string())),
        }

        debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get current configuration
    pub fn get(&self) -> &AppConfiguration {
        &self.config
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_registry_intervals_derive_from_heartbeat() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.heartbeat_interval(), Duration::from_secs(180));
        assert_eq!(registry.primary_check_interval(), Duration::from_secs(360));
        assert_eq!(registry.stale_threshold(), Duration::from_secs(540));

        let overridden = RegistryConfig {
            stale_threshold_seconds: Some(1000),
            ..RegistryConfig::default()
        };
        assert_eq!(overridden.stale_threshold(), Duration::from_secs(1000));
    }

    #[tokio::test]
    async fn test_config_from_file() {
        let mut temp_file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            temp_file,
            r#"
server:
  port: 9000
environment: development
replication:
  tables: ["accounts"]
  chunk_size: 50
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(temp_file.path().to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.environment.is_development());
        assert_eq!(config.replication.tables, vec!["accounts".to_string()]);
        assert_eq!(config.replication.chunk_size, 50);
        assert_eq!(config.replication.export_page_size, 500);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_config_file_extension_is_checked() {
        let temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        let result = ConfigManager::load_from_file(temp_file.path().to_str().unwrap()).await;
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfiguration::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.replication.enabled = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        config.replication.source_url = Some("https://source.example.com".to_string());
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.registry.stale_threshold_seconds = Some(10);
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_oversized_durations_are_config_errors() {
        let mut config = AppConfiguration::default();
        config.registry.heartbeat_interval_seconds = u64::MAX / 2;
        assert_eq!(config.registry.stale_threshold(), Duration::MAX);
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(AppError::ConfigError(_))
        ));

        let mut config = AppConfiguration::default();
        config.alerting.sessions.window_minutes = i64::MAX / 2;
        assert!(config.alerting.sessions.window().is_none());
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(AppError::ConfigError(_))
        ));

        let mut config = AppConfiguration::default();
        config.replication.interval_seconds = u64::MAX;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_unparseable_enable_flags_are_rejected() {
        let mut config = AppConfiguration::default();

        std::env::set_var("ALERTS_ENABLED", "sometimes");
        let alerts = ConfigManager::load_from_env(&mut config);
        std::env::remove_var("ALERTS_ENABLED");
        assert!(matches!(alerts, Err(AppError::ConfigError(_))));

        std::env::set_var("REPLICATION_ENABLED", "yes please");
        let replication = ConfigManager::load_from_env(&mut config);
        std::env::remove_var("REPLICATION_ENABLED");
        assert!(matches!(replication, Err(AppError::ConfigError(_))));

        std::env::set_var("REPLICATION_ENABLED", "true");
        let parsed = ConfigManager::load_from_env(&mut config);
        std::env::remove_var("REPLICATION_ENABLED");
        assert!(parsed.is_ok());
        assert!(config.replication.enabled);
    }
}
