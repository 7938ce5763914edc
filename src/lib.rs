//! Crawl-Ledger: run state tracking for batch ingestion crawlers
//!
//! This crate keeps an append-only ledger of per-item crawl outcomes and
//! derives run-level health signals from it: whether a crawler run is
//! currently active, and success/failure counts for the latest run versus
//! all runs.

pub mod config;
pub mod ledger;
pub mod storage;

use thiserror::Error;

/// Main error type for Crawl-Ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid item descriptor: {0}")]
    Descriptor(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Crawl-Ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use ledger::{
    is_running, Clock, ItemDescriptor, LastRun, Ledger, ManualClock, OutcomeRecord,
    OutcomeStatus, RecordKind, RunStats, StubAccounting, SystemClock,
};
pub use storage::{LedgerStore, SqliteStore};
