use crate::ledger::StubAccounting;
use chrono::Duration;
use serde::Deserialize;

/// Default window after the last record during which a run counts as active
pub const DEFAULT_RUNNING_TIMEOUT_MINUTES: u32 = 60;

/// Main configuration structure for Crawl-Ledger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Ledger storage and run-detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Minutes since the last record after which a run is no longer considered active
    #[serde(
        rename = "running-timeout-minutes",
        default = "default_running_timeout_minutes"
    )]
    pub running_timeout_minutes: u32,

    /// How run-start marker records are kept out of the success counts
    #[serde(rename = "stub-accounting", default)]
    pub stub_accounting: StubAccounting,
}

impl LedgerConfig {
    pub fn running_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.running_timeout_minutes))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            running_timeout_minutes: default_running_timeout_minutes(),
            stub_accounting: StubAccounting::default(),
        }
    }
}

fn default_database_path() -> String {
    "./crawl-ledger.db".to_string()
}

fn default_running_timeout_minutes() -> u32 {
    DEFAULT_RUNNING_TIMEOUT_MINUTES
}
