pub mod instance;
pub mod migration;
pub mod record;

pub use instance::InstanceRepository;
pub use migration::{db_version_from_migration, MigrationRepository, NO_MIGRATIONS_VERSION};
pub use record::RecordRepository;
