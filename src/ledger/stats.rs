//! Run statistics derived from the ledger
//!
//! This module reduces the outcome log of one crawler into the run-level
//! health signals callers check before starting a new run.

use crate::ledger::record::OutcomeStatus;
use crate::storage::{LedgerStore, OutcomeFilter, StorageResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How run-start marker records are kept out of the `ok` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StubAccounting {
    /// Subtract one from each `ok` count once a run exists
    #[default]
    Subtract,

    /// Leave marker records out of the `ok` counts entirely
    ExcludeMarkers,
}

/// Run id and timestamp of the most recent record of a crawler
///
/// Both fields are absent for a crawler that has never recorded anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub run_id: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

impl LastRun {
    /// The "no data" value of a never-run crawler
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.run_id.is_none() && self.updated.is_none()
    }
}

/// Success and failure counts over one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStats {
    pub ok: u64,
    pub fail: u64,
}

/// Counts for the latest run together with its identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRunStats {
    pub ok: u64,
    pub fail: u64,
    pub updated: Option<DateTime<Utc>>,
    pub run_id: Option<String>,
}

/// Aggregate statistics for one crawler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Whether the crawler recorded anything within the running timeout
    pub running: bool,

    /// Counts for the most recent run
    pub last: LastRunStats,

    /// Counts over every run of the crawler
    pub all: ScopeStats,
}

/// Returns true if a run whose last record is at `last_run_time` still counts as active
///
/// This is a heuristic, not a lock: a run that stalled inside the window
/// still reads as running.
pub fn is_running(
    now: DateTime<Utc>,
    last_run_time: Option<DateTime<Utc>>,
    timeout: Duration,
) -> bool {
    match last_run_time {
        Some(last) => now - last < timeout,
        None => false,
    }
}

/// Derives the statistics of `crawler_id` as of `now`
pub fn derive_stats(
    store: &dyn LedgerStore,
    crawler_id: &str,
    now: DateTime<Utc>,
    timeout: Duration,
    accounting: StubAccounting,
) -> StorageResult<RunStats> {
    let last_run = store.last_run(crawler_id)?;
    let running = is_running(now, last_run.updated, timeout);

    let (last, all) = match last_run.run_id.as_deref() {
        // An uninitialized crawler reports a clean zero state
        None => (ScopeStats::default(), ScopeStats::default()),
        Some(run_id) => (
            scope_stats(store, crawler_id, Some(run_id), accounting)?,
            scope_stats(store, crawler_id, None, accounting)?,
        ),
    };

    Ok(RunStats {
        running,
        last: LastRunStats {
            ok: last.ok,
            fail: last.fail,
            updated: last_run.updated,
            run_id: last_run.run_id,
        },
        all,
    })
}

fn scope_stats(
    store: &dyn LedgerStore,
    crawler_id: &str,
    crawler_run: Option<&str>,
    accounting: StubAccounting,
) -> StorageResult<ScopeStats> {
    let ok_filter = OutcomeFilter {
        crawler_id,
        crawler_run,
        status: OutcomeStatus::Ok,
        exclude_markers: accounting == StubAccounting::ExcludeMarkers,
    };
    let fail_filter = OutcomeFilter {
        status: OutcomeStatus::Fail,
        exclude_markers: false,
        ..ok_filter
    };

    let ok = store.count_outcomes(&ok_filter)?;
    let ok = match accounting {
        StubAccounting::Subtract => ok.saturating_sub(1),
        StubAccounting::ExcludeMarkers => ok,
    };
    let fail = store.count_outcomes(&fail_filter)?;

    Ok(ScopeStats { ok, fail })
}

/// Prints run statistics to stdout in a formatted manner
pub fn print_stats(crawler_id: &str, stats: &RunStats) {
    println!("=== Crawler Statistics: {} ===\n", crawler_id);

    println!(
        "Status: {}",
        if stats.running { "running" } else { "idle" }
    );
    println!();

    println!("Last Run:");
    match (&stats.last.run_id, stats.last.updated) {
        (None, None) => println!("  (never run)"),
        (run_id, updated) => {
            println!("  Run ID: {}", run_id.as_deref().unwrap_or("-"));
            if let Some(updated) = updated {
                println!("  Updated: {}", updated.to_rfc3339());
            }
            println!("  OK: {}", stats.last.ok);
            println!("  Failed: {}", stats.last.fail);
        }
    }
    println!();

    println!("All Runs:");
    println!("  OK: {}", stats.all.ok);
    println!("  Failed: {}", stats.all.fail);

    let total = stats.all.ok + stats.all.fail;
    if total > 0 {
        let success_rate = (stats.all.ok as f64 / total as f64) * 100.0;
        println!(
            "\nSuccess Rate: {:.1}% ({} / {} items)",
            success_rate, stats.all.ok, total
        );
    }
}
