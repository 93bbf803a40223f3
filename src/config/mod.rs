pub mod app_config;
pub mod environment;

pub use app_config::{
    AlertingConfig, AppConfiguration, ConfigManager, DatabaseConfig, LoggingConfig,
    ObservabilityConfig, RegistryConfig, ReplicationConfig, ScalingAlertConfig,
    ServerConfig, SessionsAlertConfig,
};
pub use environment::Environment;
