pub mod info;
pub mod replication;

pub use info::{info_router, InfoResponse};
pub use replication::replication_router;
