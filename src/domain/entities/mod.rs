pub mod instance;
pub mod record;

pub use instance::{HostStats, InstanceEntity, InstanceId};
pub use record::{SyncRecord, UpsertSummary};
