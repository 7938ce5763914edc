//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Crawl-Ledger database.

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
///
/// Deleting a collection deletes all of its outcome records through the
/// `ON DELETE CASCADE` foreign key (requires `PRAGMA foreign_keys = ON`).
pub const SCHEMA_SQL: &str = r#"
-- Owning scope of outcome records
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Append-only log of per-item outcomes and run-start markers
CREATE TABLE IF NOT EXISTS outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler_id TEXT NOT NULL,
    crawler_run TEXT,
    content_hash TEXT,
    foreign_id TEXT,
    status TEXT NOT NULL CHECK (status IN ('ok', 'fail')),
    error_type TEXT,
    error_message TEXT,
    error_details TEXT,
    metadata TEXT,
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outcomes_crawler ON outcomes(crawler_id, created_at);
CREATE INDEX IF NOT EXISTS idx_outcomes_run ON outcomes(crawler_id, crawler_run);
CREATE INDEX IF NOT EXISTS idx_outcomes_content_hash ON outcomes(content_hash);
CREATE INDEX IF NOT EXISTS idx_outcomes_foreign_id ON outcomes(foreign_id);
CREATE INDEX IF NOT EXISTS idx_outcomes_collection ON outcomes(collection_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    if schema_version(conn)? == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    }
    Ok(())
}

/// Reads the schema version recorded in the database (0 when uninitialized)
pub fn schema_version(conn: &rusqlite::Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}
