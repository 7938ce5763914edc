//! Storage traits and error types
//!
//! This module defines the trait interface for ledger storage backends and
//! associated error types.

use crate::ledger::{LastRun, NewOutcome, OutcomeRecord, OutcomeStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// An owning collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Selects the outcome records counted for one statistic
#[derive(Debug, Clone, Copy)]
pub struct OutcomeFilter<'a> {
    pub crawler_id: &'a str,

    /// Restrict to one run; `None` covers every run of the crawler
    pub crawler_run: Option<&'a str>,

    pub status: OutcomeStatus,

    /// Leave run-start markers out of the count
    pub exclude_markers: bool,
}

/// Trait for ledger storage backends
///
/// Outcome records are append-only: no method updates a stored outcome.
/// The only way records disappear is by deleting their owning collection.
pub trait LedgerStore {
    // ===== Collections =====

    /// Creates a collection and returns its id
    fn create_collection(&mut self, label: &str, created_at: DateTime<Utc>)
        -> StorageResult<i64>;

    /// Gets a collection by id
    fn get_collection(&self, collection_id: i64) -> StorageResult<CollectionRecord>;

    /// Gets all collections in id order
    fn list_collections(&self) -> StorageResult<Vec<CollectionRecord>>;

    /// Deletes a collection and, by cascade, all of its outcome records
    ///
    /// # Returns
    ///
    /// The number of outcome records removed
    fn delete_collection(&mut self, collection_id: i64) -> StorageResult<u64>;

    // ===== Outcomes =====

    /// Appends an outcome, assigning its id and timestamp
    ///
    /// # Arguments
    ///
    /// * `outcome` - The outcome to store
    /// * `created_at` - Insertion time (stored at microsecond precision)
    ///
    /// # Returns
    ///
    /// The stored record exactly as it will be read back
    fn append_outcome(
        &mut self,
        outcome: NewOutcome,
        created_at: DateTime<Utc>,
    ) -> StorageResult<OutcomeRecord>;

    /// Gets the run id and timestamp of the crawler's most recent record
    ///
    /// Ties on `created_at` go to the highest id. Returns [`LastRun::none`]
    /// when the crawler has no records.
    fn last_run(&self, crawler_id: &str) -> StorageResult<LastRun>;

    /// Counts outcome records matching `filter`
    fn count_outcomes(&self, filter: &OutcomeFilter<'_>) -> StorageResult<u64>;

    /// Gets every outcome record in id order
    fn list_outcomes(&self) -> StorageResult<Vec<OutcomeRecord>>;

    /// Gets the outcome records of one collection in id order
    fn list_outcomes_for_collection(&self, collection_id: i64)
        -> StorageResult<Vec<OutcomeRecord>>;

    /// Gets the outcome records of one crawler in id order
    fn list_outcomes_for_crawler(&self, crawler_id: &str) -> StorageResult<Vec<OutcomeRecord>>;
}
