pub mod database;
pub mod replication_client;
pub mod repositories;
pub mod webhook_notifier;

pub use replication_client::HttpReplicationSource;
pub use webhook_notifier::WebhookNotifier;
