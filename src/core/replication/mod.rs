//! Pull-based replication between deployments

pub mod scheduler;
pub mod service;
pub mod source;

pub use scheduler::ReplicationScheduler;
pub use service::{ReplicationReport, ReplicationService, TableReport};
pub use source::ReplicationSource;
