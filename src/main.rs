//! Crawl-Ledger main entry point
//!
//! This is the command-line interface for the Crawl-Ledger run state tracker.

use clap::{Args, Parser, Subcommand};
use crawl_ledger::config::load_config_or_default;
use crawl_ledger::ledger::{content_hash_file, print_stats, ItemDescriptor, Ledger, OutcomeRecord};
use crawl_ledger::storage::LedgerStore;
use crawl_ledger::LedgerError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Crawl-Ledger: run state tracking for batch ingestion crawlers
///
/// Crawl-Ledger records the outcome of every item a crawler processes and
/// reports whether a crawler run is active, along with success and failure
/// counts for the latest run and for all runs.
#[derive(Parser, Debug)]
#[command(name = "crawl-ledger")]
#[command(version = "1.0.0")]
#[command(about = "Run state tracking for batch ingestion crawlers", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a collection to own outcome records
    CollectionCreate {
        /// Human-readable collection label
        #[arg(long)]
        label: String,
    },

    /// Delete a collection and all of its outcome records
    CollectionDelete {
        /// Collection id
        #[arg(long)]
        id: i64,
    },

    /// List collections
    Collections,

    /// Record that a crawler run has started
    Start {
        #[arg(long)]
        collection: i64,

        #[arg(long)]
        crawler: String,

        #[arg(long)]
        run: String,
    },

    /// Record a successfully processed item
    Ok {
        #[command(flatten)]
        item: ItemArgs,
    },

    /// Record a failed item
    Fail {
        #[command(flatten)]
        item: ItemArgs,

        #[arg(long)]
        error_type: Option<String>,

        #[arg(long)]
        error_message: Option<String>,

        #[arg(long)]
        error_details: Option<String>,
    },

    /// Show the latest run of a crawler
    LastRun {
        #[arg(long)]
        crawler: String,
    },

    /// Show run statistics for a crawler
    Stats {
        #[arg(long)]
        crawler: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List outcome records
    List {
        /// Only records owned by this collection
        #[arg(long, conflicts_with = "crawler")]
        collection: Option<i64>,

        /// Only records of this crawler
        #[arg(long)]
        crawler: Option<String>,

        /// Print JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Item description for `ok` and `fail`
#[derive(Args, Debug)]
struct ItemArgs {
    /// Owning collection id
    #[arg(long)]
    collection: i64,

    /// JSON item descriptor file
    #[arg(long, conflicts_with_all = ["crawler", "run", "foreign_id", "attr"])]
    descriptor: Option<PathBuf>,

    /// Crawler id
    #[arg(long, required_unless_present = "descriptor")]
    crawler: Option<String>,

    /// Crawler run id
    #[arg(long)]
    run: Option<String>,

    /// External item id
    #[arg(long)]
    foreign_id: Option<String>,

    /// Item content; its SHA-256 becomes the content hash
    #[arg(long)]
    file: Option<PathBuf>,

    /// Extra attribute as KEY=VALUE (repeatable)
    #[arg(long, value_parser = parse_attr)]
    attr: Vec<(String, String)>,
}

fn parse_attr(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl ItemArgs {
    fn to_descriptor(&self) -> Result<ItemDescriptor, LedgerError> {
        let mut item = match (&self.descriptor, &self.crawler) {
            (Some(path), _) => ItemDescriptor::from_json_file(path)?,
            (None, Some(crawler)) => {
                let mut item = ItemDescriptor::new(crawler.as_str());
                item.crawler_run = self.run.clone();
                item.foreign_id = self.foreign_id.clone();
                for (key, value) in &self.attr {
                    item = item.with_attribute(key.as_str(), value.as_str());
                }
                item
            }
            (None, None) => {
                return Err(LedgerError::Descriptor(
                    "either --descriptor or --crawler is required".to_string(),
                ))
            }
        };

        if let Some(path) = &self.file {
            item.content_hash = Some(content_hash_file(path)?);
        }

        item.validate()?;
        Ok(item)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match load_config_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::debug!("Using ledger database: {}", config.ledger.database_path);

    let mut ledger = Ledger::open(&config.ledger)?;

    match cli.command {
        Command::CollectionCreate { label } => {
            let id = ledger.create_collection(&label)?;
            println!("{}", id);
        }
        Command::CollectionDelete { id } => {
            let removed = ledger.delete_collection(id)?;
            println!("Deleted collection {} ({} outcome records)", id, removed);
        }
        Command::Collections => {
            for collection in ledger.store().list_collections()? {
                println!(
                    "{:>6}  {}  {}",
                    collection.id,
                    collection.created_at.to_rfc3339(),
                    collection.label
                );
            }
        }
        Command::Start {
            collection,
            crawler,
            run,
        } => {
            let record = ledger.record_stub(collection, &crawler, &run)?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::Ok { item } => {
            let record = ledger.record_success(&item.to_descriptor()?, item.collection)?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::Fail {
            item,
            error_type,
            error_message,
            error_details,
        } => {
            let record = ledger.record_failure(
                &item.to_descriptor()?,
                item.collection,
                error_type.as_deref(),
                error_message.as_deref(),
                error_details.as_deref(),
            )?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::LastRun { crawler } => {
            let last = ledger.last_run(&crawler)?;
            if last.is_none() {
                println!("Crawler {} has never run", crawler);
            } else {
                println!(
                    "{}\t{}",
                    last.run_id.as_deref().unwrap_or("-"),
                    last.updated.map(|t| t.to_rfc3339()).unwrap_or_default()
                );
            }
        }
        Command::Stats { crawler, json } => {
            let stats = ledger.stats(&crawler)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&crawler, &stats);
            }
        }
        Command::List {
            collection,
            crawler,
            json,
        } => {
            let records = match (collection, crawler) {
                (Some(id), _) => ledger.list_for_collection(id)?,
                (None, Some(crawler)) => ledger.list_for_crawler(&crawler)?,
                (None, None) => ledger.list_all()?,
            };
            print_records(&records, json)?;
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_ledger=warn"),
            1 => EnvFilter::new("crawl_ledger=info,warn"),
            2 => EnvFilter::new("crawl_ledger=debug,info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_records(records: &[OutcomeRecord], json: bool) -> Result<(), LedgerError> {
    if json {
        for record in records {
            println!("{}", serde_json::to_string(&record.to_map()?)?);
        }
        return Ok(());
    }

    for record in records {
        println!(
            "{:>6}  {}  {:<5} {:<16} {:<16} {}",
            record.id,
            record.created_at.to_rfc3339(),
            if record.is_stub() {
                "start"
            } else {
                record.status.to_db_string()
            },
            record.crawler_id,
            record.crawler_run.as_deref().unwrap_or("-"),
            record
                .foreign_id
                .as_deref()
                .or(record.error_type.as_deref())
                .unwrap_or("")
        );
    }
    println!("\n{} records", records.len());

    Ok(())
}
