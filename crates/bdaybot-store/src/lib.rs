//! # bdaybot store
//! Birthday store backends.

pub mod memory;
pub mod sqlite;

use bdaybot_core::config::StorageConfig;
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::traits::BirthdayStore;
use std::path::Path;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Create a store from configuration. `db_path` is the expanded storage path.
pub fn create_store(config: &StorageConfig, db_path: &Path) -> Result<Box<dyn BirthdayStore>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Box::new(
            SqliteStore::open(db_path)?.with_max_records(config.max_records_per_group),
        )),
        "memory" => Ok(Box::new(
            InMemoryStore::new().with_max_records(config.max_records_per_group),
        )),
        other => Err(BdayError::config(format!("Unknown storage backend: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_store_backends() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("b.db");

        let mut config = StorageConfig::default();
        assert_eq!(create_store(&config, &db).unwrap().name(), "sqlite");

        config.backend = "memory".into();
        assert_eq!(create_store(&config, &db).unwrap().name(), "memory");

        config.backend = "redis".into();
        assert!(matches!(create_store(&config, &db), Err(BdayError::Config(_))));
    }
}
