//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the LedgerStore trait.

use crate::ledger::{LastRun, Metadata, NewOutcome, OutcomeRecord, OutcomeStatus, INIT_ERROR_TYPE};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CollectionRecord, LedgerStore, OutcomeFilter, StorageError, StorageResult,
};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const OUTCOME_COLUMNS: &str = "id, status, crawler_id, crawler_run, content_hash, foreign_id,
     error_type, error_message, error_details, metadata, collection_id, created_at";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Parallel reporters each open their own connection
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        tracing::debug!("Opened ledger database at {}", path.display());
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_outcomes<P: rusqlite::Params>(
        &self,
        filter_sql: &str,
        params: P,
    ) -> StorageResult<Vec<OutcomeRecord>> {
        let sql = format!(
            "SELECT {} FROM outcomes {} ORDER BY id ASC",
            OUTCOME_COLUMNS, filter_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let records = stmt
            .query_map(params, outcome_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// Formats a timestamp so that lexical order matches chronological order
fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<OutcomeRecord> {
    let status_text: String = row.get(1)?;
    let status = OutcomeStatus::from_db_string(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            Box::new(StorageError::InvalidValue(format!(
                "unknown outcome status '{}'",
                status_text
            ))),
        )
    })?;

    let metadata = match row.get::<_, Option<String>>(9)? {
        Some(text) => Some(
            serde_json::from_str::<Metadata>(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
            })?,
        ),
        None => None,
    };

    let created_at: String = row.get(11)?;

    Ok(OutcomeRecord {
        id: row.get(0)?,
        status,
        crawler_id: row.get(2)?,
        crawler_run: row.get(3)?,
        content_hash: row.get(4)?,
        foreign_id: row.get(5)?,
        error_type: row.get(6)?,
        error_message: row.get(7)?,
        error_details: row.get(8)?,
        metadata,
        collection_id: row.get(10)?,
        created_at: parse_timestamp(11, &created_at)?,
    })
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRecord> {
    let created_at: String = row.get(2)?;
    Ok(CollectionRecord {
        id: row.get(0)?,
        label: row.get(1)?,
        created_at: parse_timestamp(2, &created_at)?,
    })
}

/// Maps foreign key and check failures to a constraint violation
fn constraint_error(err: rusqlite::Error, context: &str) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, ref message)
            if e.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(format!(
                "{}: {}",
                context,
                message.as_deref().unwrap_or("constraint failed")
            ))
        }
        other => StorageError::Sqlite(other),
    }
}

impl LedgerStore for SqliteStore {
    // ===== Collections =====

    fn create_collection(
        &mut self,
        label: &str,
        created_at: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO collections (label, created_at) VALUES (?1, ?2)",
            params![label, format_timestamp(&created_at.trunc_subsecs(6))],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_collection(&self, collection_id: i64) -> StorageResult<CollectionRecord> {
        self.conn
            .query_row(
                "SELECT id, label, created_at FROM collections WHERE id = ?1",
                params![collection_id],
                collection_from_row,
            )
            .optional()?
            .ok_or(StorageError::CollectionNotFound(collection_id))
    }

    fn list_collections(&self) -> StorageResult<Vec<CollectionRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, created_at FROM collections ORDER BY id ASC")?;

        let collections = stmt
            .query_map([], collection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(collections)
    }

    fn delete_collection(&mut self, collection_id: i64) -> StorageResult<u64> {
        // Take the write lock up front; a deferred read-then-write transaction
        // fails with SQLITE_BUSY if another connection commits in between
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed: i64 = tx.query_row(
            "SELECT COUNT(*) FROM outcomes WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get(0),
        )?;

        let deleted = tx.execute(
            "DELETE FROM collections WHERE id = ?1",
            params![collection_id],
        )?;
        if deleted == 0 {
            return Err(StorageError::CollectionNotFound(collection_id));
        }

        tx.commit()?;
        Ok(removed as u64)
    }

    // ===== Outcomes =====

    fn append_outcome(
        &mut self,
        outcome: NewOutcome,
        created_at: DateTime<Utc>,
    ) -> StorageResult<OutcomeRecord> {
        let created_at = created_at.trunc_subsecs(6);
        let metadata = outcome
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO outcomes (crawler_id, crawler_run, content_hash, foreign_id, status,
                 error_type, error_message, error_details, metadata, collection_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    outcome.crawler_id,
                    outcome.crawler_run,
                    outcome.content_hash,
                    outcome.foreign_id,
                    outcome.status.to_db_string(),
                    outcome.error_type,
                    outcome.error_message,
                    outcome.error_details,
                    metadata,
                    outcome.collection_id,
                    format_timestamp(&created_at),
                ],
            )
            .map_err(|e| {
                constraint_error(
                    e,
                    &format!("outcome for collection {}", outcome.collection_id),
                )
            })?;

        let id = self.conn.last_insert_rowid();
        Ok(OutcomeRecord::from_new(id, created_at, outcome))
    }

    fn last_run(&self, crawler_id: &str) -> StorageResult<LastRun> {
        let latest = self
            .conn
            .query_row(
                "SELECT crawler_run, created_at FROM outcomes WHERE crawler_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![crawler_id],
                |row| {
                    let created_at: String = row.get(1)?;
                    Ok(LastRun {
                        run_id: row.get(0)?,
                        updated: Some(parse_timestamp(1, &created_at)?),
                    })
                },
            )
            .optional()?;

        Ok(latest.unwrap_or_else(LastRun::none))
    }

    fn count_outcomes(&self, filter: &OutcomeFilter<'_>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outcomes
             WHERE crawler_id = ?1
               AND (?2 IS NULL OR crawler_run = ?2)
               AND status = ?3
               AND (?4 = 0 OR error_type IS NULL OR error_type != ?5)",
            params![
                filter.crawler_id,
                filter.crawler_run,
                filter.status.to_db_string(),
                filter.exclude_markers,
                INIT_ERROR_TYPE,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_outcomes(&self) -> StorageResult<Vec<OutcomeRecord>> {
        self.query_outcomes("", [])
    }

    fn list_outcomes_for_collection(
        &self,
        collection_id: i64,
    ) -> StorageResult<Vec<OutcomeRecord>> {
        self.query_outcomes("WHERE collection_id = ?1", params![collection_id])
    }

    fn list_outcomes_for_crawler(&self, crawler_id: &str) -> StorageResult<Vec<OutcomeRecord>> {
        self.query_outcomes("WHERE crawler_id = ?1", params![crawler_id])
    }
}
