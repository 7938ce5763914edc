//! Configuration module for Crawl-Ledger
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_ledger::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ledger.toml")).unwrap();
//! println!("Ledger database: {}", config.ledger.database_path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, LedgerConfig, DEFAULT_RUNNING_TIMEOUT_MINUTES};

// Re-export parser functions
pub use parser::{load_config, load_config_or_default, parse_config};
