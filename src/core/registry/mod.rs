//! Instance registry and leader election
//!
//! Every process registers a row in the shared store, keeps its heartbeat
//! fresh and elects the oldest live registrant as leader. There is no lock
//! or fencing token: each process reads the same live set and converges on
//! its own, so short windows with zero or two leaders are possible.

pub mod host_stats;
pub mod leadership;
pub mod service;

pub use host_stats::{local_hostname, local_ip_address, HostStatsCollector};
pub use leadership::LeadershipHandle;
pub use service::InstanceRegistry;
