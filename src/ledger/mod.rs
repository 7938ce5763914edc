//! Run state ledger
//!
//! The ledger owns the append-only log of per-item crawl outcomes and derives
//! run statistics from it. Reporters append one record per finished item (or
//! one marker per started run); readers ask for [`RunStats`] before deciding
//! whether to start a new run.
//!
//! # Components
//!
//! - `OutcomeRecord`: immutable log entry for one item or run-start marker
//! - `ItemDescriptor` / `MetadataFlattener`: what reporters hand in, and how it becomes metadata
//! - `RunStats`: the derived health signals
//! - `Clock`: the time source for timestamps and the running check

mod clock;
mod descriptor;
mod record;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::{
    content_hash, content_hash_file, validate_crawler_id, DottedFlattener, ItemDescriptor,
    MetadataFlattener,
};
pub use record::{Metadata, NewOutcome, OutcomeRecord, OutcomeStatus, RecordKind, INIT_ERROR_TYPE};
pub use stats::{
    derive_stats, is_running, print_stats, LastRun, LastRunStats, RunStats, ScopeStats,
    StubAccounting,
};

use crate::config::{LedgerConfig, DEFAULT_RUNNING_TIMEOUT_MINUTES};
use crate::storage::{open_storage, LedgerStore, SqliteStore};
use crate::LedgerError;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::Arc;

/// The run state ledger over a storage backend
pub struct Ledger<S: LedgerStore> {
    store: S,
    clock: Arc<dyn Clock>,
    flattener: Box<dyn MetadataFlattener>,
    timeout: Duration,
    accounting: StubAccounting,
}

impl Ledger<SqliteStore> {
    /// Opens the SQLite ledger described by `config`
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let store = open_storage(Path::new(&config.database_path))?;
        Ok(Self::with_config(store, config))
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Creates a ledger with the default timeout, wall-clock time and dotted flattening
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            flattener: Box::new(DottedFlattener),
            timeout: Duration::minutes(i64::from(DEFAULT_RUNNING_TIMEOUT_MINUTES)),
            accounting: StubAccounting::default(),
        }
    }

    /// Creates a ledger using the timeout and stub accounting from `config`
    pub fn with_config(store: S, config: &LedgerConfig) -> Self {
        Self::new(store)
            .with_timeout(config.running_timeout())
            .with_stub_accounting(config.stub_accounting)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_flattener(mut self, flattener: Box<dyn MetadataFlattener>) -> Self {
        self.flattener = flattener;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stub_accounting(mut self, accounting: StubAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    /// Returns the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ===== Collections =====

    /// Creates an owning collection and returns its id
    pub fn create_collection(&mut self, label: &str) -> Result<i64, LedgerError> {
        let collection_id = self.store.create_collection(label, self.clock.now())?;
        tracing::info!("Created collection {} ({})", collection_id, label);
        Ok(collection_id)
    }

    /// Deletes a collection together with all of its outcome records
    ///
    /// Returns the number of outcome records removed.
    pub fn delete_collection(&mut self, collection_id: i64) -> Result<u64, LedgerError> {
        let removed = self.store.delete_collection(collection_id)?;
        tracing::info!(
            "Deleted collection {} and {} outcome records",
            collection_id,
            removed
        );
        Ok(removed)
    }

    // ===== Reporting =====

    /// Records that `crawler_run` has started, before any item completes
    pub fn record_stub(
        &mut self,
        collection_id: i64,
        crawler_id: &str,
        crawler_run: &str,
    ) -> Result<OutcomeRecord, LedgerError> {
        validate_crawler_id(crawler_id)?;
        let outcome = NewOutcome::stub(collection_id, crawler_id, crawler_run);
        let record = self.append(outcome)?;
        tracing::info!("Run {} of crawler {} started", crawler_run, crawler_id);
        Ok(record)
    }

    /// Records a successfully processed item
    pub fn record_success(
        &mut self,
        item: &ItemDescriptor,
        collection_id: i64,
    ) -> Result<OutcomeRecord, LedgerError> {
        let outcome = self.outcome_from_item(item, collection_id, OutcomeStatus::Ok)?;
        self.append(outcome)
    }

    /// Records a failed item with optional diagnostics
    pub fn record_failure(
        &mut self,
        item: &ItemDescriptor,
        collection_id: i64,
        error_type: Option<&str>,
        error_message: Option<&str>,
        error_details: Option<&str>,
    ) -> Result<OutcomeRecord, LedgerError> {
        let mut outcome = self.outcome_from_item(item, collection_id, OutcomeStatus::Fail)?;
        outcome.error_type = error_type.map(str::to_string);
        outcome.error_message = error_message.map(str::to_string);
        outcome.error_details = error_details.map(str::to_string);

        let record = self.append(outcome)?;
        tracing::warn!(
            "Crawler {} failed on item {}: {}",
            record.crawler_id,
            record.foreign_id.as_deref().unwrap_or("<unknown>"),
            record.error_type.as_deref().unwrap_or("unspecified error")
        );
        Ok(record)
    }

    fn outcome_from_item(
        &self,
        item: &ItemDescriptor,
        collection_id: i64,
        status: OutcomeStatus,
    ) -> Result<NewOutcome, LedgerError> {
        item.validate()?;
        Ok(NewOutcome {
            collection_id,
            crawler_id: item.crawler.clone(),
            crawler_run: item.crawler_run.clone(),
            content_hash: item.content_hash.clone(),
            foreign_id: item.foreign_id.clone(),
            status,
            error_type: None,
            error_message: None,
            error_details: None,
            metadata: Some(self.flattener.flatten(item)),
        })
    }

    fn append(&mut self, outcome: NewOutcome) -> Result<OutcomeRecord, LedgerError> {
        let record = self.store.append_outcome(outcome, self.clock.now())?;
        tracing::debug!("Appended {}", record);
        Ok(record)
    }

    // ===== Queries =====

    /// Returns the run id and timestamp of the crawler's most recent record
    pub fn last_run(&self, crawler_id: &str) -> Result<LastRun, LedgerError> {
        Ok(self.store.last_run(crawler_id)?)
    }

    /// Derives run statistics for `crawler_id` as of now
    pub fn stats(&self, crawler_id: &str) -> Result<RunStats, LedgerError> {
        self.stats_at(crawler_id, self.clock.now())
    }

    /// Derives run statistics for `crawler_id` as of `now`
    pub fn stats_at(&self, crawler_id: &str, now: DateTime<Utc>) -> Result<RunStats, LedgerError> {
        let stats = derive_stats(&self.store, crawler_id, now, self.timeout, self.accounting)?;
        tracing::debug!(
            "Stats for {}: running={}, last ok={} fail={}, all ok={} fail={}",
            crawler_id,
            stats.running,
            stats.last.ok,
            stats.last.fail,
            stats.all.ok,
            stats.all.fail
        );
        Ok(stats)
    }

    /// Returns every record in the ledger in id order
    pub fn list_all(&self) -> Result<Vec<OutcomeRecord>, LedgerError> {
        Ok(self.store.list_outcomes()?)
    }

    /// Returns the records owned by one collection in id order
    pub fn list_for_collection(&self, collection_id: i64) -> Result<Vec<OutcomeRecord>, LedgerError> {
        Ok(self.store.list_outcomes_for_collection(collection_id)?)
    }

    /// Returns the records of one crawler in id order
    pub fn list_for_crawler(&self, crawler_id: &str) -> Result<Vec<OutcomeRecord>, LedgerError> {
        Ok(self.store.list_outcomes_for_crawler(crawler_id)?)
    }
}
