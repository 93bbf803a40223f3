pub mod instance_repository;
pub mod memory;
pub mod migration_repository;
pub mod record_repository;

pub use instance_repository::MongoInstanceRepository;
pub use memory::{InMemoryInstanceRepository, InMemoryMigrationRepository, InMemoryRecordRepository};
pub use migration_repository::MongoMigrationRepository;
pub use record_repository::MongoRecordRepository;
