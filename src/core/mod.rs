pub mod alerting;
pub mod logging;
pub mod registry;
pub mod replication;
pub mod transfer;
