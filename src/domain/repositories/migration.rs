//! Schema migration bookkeeping

use async_trait::async_trait;

use crate::error::Result;

/// Token reported when no migration has been applied
pub const NO_MIGRATIONS_VERSION: &str = "none";

/// Read access to the applied-migrations log
#[async_trait]
pub trait MigrationRepository: Send + Sync {
    /// Name of the most recently applied migration
    async fn latest_migration(&self) -> Result<Option<String>>;

    /// Schema-compatibility token exchanged between deployments
    async fn db_version(&self) -> Result<String> {
        Ok(self
            .latest_migration()
            .await?
            .map(|name| db_version_from_migration(&name))
            .unwrap_or_else(|| NO_MIGRATIONS_VERSION.to_string()))
    }
}

/// Strip the script extension from a migration name
pub fn db_version_from_migration(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_version_from_migration() {
        assert_eq!(
            db_version_from_migration("20240501093000_add_sessions.sql"),
            "20240501093000_add_sessions"
        );
        assert_eq!(
            db_version_from_migration("migrations/0007_indexes.up.sql"),
            "0007_indexes"
        );
        assert_eq!(db_version_from_migration("0003_init"), "0003_init");
    }
}
