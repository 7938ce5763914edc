//! Storage module for persisting the outcome ledger
//!
//! This module handles all database operations for the ledger, including:
//! - SQLite database initialization and schema management
//! - Appending outcome records
//! - Run lookups and outcome counting
//! - Collection ownership with cascading deletes

mod schema;
mod sqlite;
mod traits;

pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteStore;
pub use traits::{
    CollectionRecord, LedgerStore, OutcomeFilter, StorageError, StorageResult,
};

use std::path::Path;

/// Initializes or opens a ledger database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}
