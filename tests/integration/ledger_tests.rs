//! Integration tests for the run state ledger
//!
//! These tests run the ledger against on-disk SQLite databases and drive
//! several reporters in parallel the way a crawl worker pool would.

use chrono::{Duration, TimeZone, Utc};
use crawl_ledger::config::{parse_config, LedgerConfig};
use crawl_ledger::ledger::{ItemDescriptor, Ledger, ManualClock, OutcomeRecord, StubAccounting};
use crawl_ledger::storage::SqliteStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a ledger config pointing at a database inside `dir`
fn create_test_config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig {
        database_path: dir.path().join("ledger.db").display().to_string(),
        ..LedgerConfig::default()
    }
}

fn item(run: &str, foreign_id: &str) -> ItemDescriptor {
    ItemDescriptor::new("crawlerA")
        .with_run(run)
        .with_foreign_id(foreign_id)
}

#[test]
fn test_list_all_returns_inserted_records_in_id_order() {
    let dir = TempDir::new().unwrap();
    let mut ledger = Ledger::open(&create_test_config(&dir)).unwrap();
    let collection_id = ledger.create_collection("gazettes").unwrap();

    let mut inserted = vec![ledger.record_stub(collection_id, "crawlerA", "run1").unwrap()];
    for n in 0..5 {
        let descriptor = item("run1", &format!("doc-{}", n));
        let record = if n % 2 == 0 {
            ledger.record_success(&descriptor, collection_id).unwrap()
        } else {
            ledger
                .record_failure(&descriptor, collection_id, Some("ParseError"), None, None)
                .unwrap()
        };
        inserted.push(record);
    }

    let listed = ledger.list_all().unwrap();
    assert_eq!(listed, inserted);
    assert!(listed.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    {
        let mut ledger = Ledger::open(&config).unwrap();
        let collection_id = ledger.create_collection("gazettes").unwrap();
        ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
        ledger
            .record_success(&item("run1", "doc-1"), collection_id)
            .unwrap();
    }

    let ledger = Ledger::open(&config).unwrap();
    let stats = ledger.stats("crawlerA").unwrap();
    assert_eq!(stats.last.run_id.as_deref(), Some("run1"));
    assert_eq!(stats.last.ok, 1);
    assert_eq!(ledger.list_all().unwrap().len(), 2);
}

#[test]
fn test_two_runs_last_and_all_scopes() {
    let start = Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let mut ledger = Ledger::new(SqliteStore::new_in_memory().unwrap()).with_clock(clock.clone());
    let collection_id = ledger.create_collection("gazettes").unwrap();

    ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
    ledger
        .record_success(&item("run1", "doc-1"), collection_id)
        .unwrap();
    ledger
        .record_failure(&item("run1", "doc-2"), collection_id, None, Some("404"), None)
        .unwrap();

    clock.advance(Duration::days(1));
    ledger.record_stub(collection_id, "crawlerA", "run2").unwrap();
    clock.advance(Duration::minutes(1));
    ledger
        .record_success(&item("run2", "doc-1"), collection_id)
        .unwrap();
    ledger
        .record_success(&item("run2", "doc-2"), collection_id)
        .unwrap();

    let stats = ledger.stats("crawlerA").unwrap();
    assert!(stats.running);
    assert_eq!(stats.last.run_id.as_deref(), Some("run2"));
    assert_eq!(stats.last.updated, Some(start + Duration::days(1) + Duration::minutes(1)));
    assert_eq!(stats.last.ok, 2);
    assert_eq!(stats.last.fail, 0);
    // Both stubs are ok records; the correction removes only one of them
    assert_eq!(stats.all.ok, 4);
    assert_eq!(stats.all.fail, 1);
}

#[test]
fn test_exclude_markers_counts_only_items() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut ledger = Ledger::new(SqliteStore::new_in_memory().unwrap())
        .with_clock(clock.clone())
        .with_stub_accounting(StubAccounting::ExcludeMarkers);
    let collection_id = ledger.create_collection("gazettes").unwrap();

    for run in ["run1", "run2"] {
        ledger.record_stub(collection_id, "crawlerA", run).unwrap();
        clock.advance(Duration::seconds(1));
        ledger
            .record_success(&item(run, "doc-1"), collection_id)
            .unwrap();
        clock.advance(Duration::seconds(1));
    }

    let stats = ledger.stats("crawlerA").unwrap();
    assert_eq!(stats.last.ok, 1);
    assert_eq!(stats.all.ok, 2);
}

#[test]
fn test_running_flag_follows_latest_record() {
    let start = Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let mut ledger = Ledger::new(SqliteStore::new_in_memory().unwrap()).with_clock(clock.clone());
    let collection_id = ledger.create_collection("gazettes").unwrap();

    assert!(!ledger.stats("crawlerA").unwrap().running);

    ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
    clock.advance(Duration::minutes(45));
    ledger
        .record_success(&item("run1", "doc-1"), collection_id)
        .unwrap();

    // 90 minutes after the stub but 45 after the latest item
    clock.advance(Duration::minutes(45));
    assert!(ledger.stats("crawlerA").unwrap().running);

    clock.advance(Duration::minutes(16));
    assert!(!ledger.stats("crawlerA").unwrap().running);
}

#[test]
fn test_crawlers_are_isolated() {
    let mut ledger = Ledger::new(SqliteStore::new_in_memory().unwrap());
    let collection_id = ledger.create_collection("gazettes").unwrap();

    ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
    ledger
        .record_success(&item("run1", "doc-1"), collection_id)
        .unwrap();

    let other = ledger.stats("crawlerB").unwrap();
    assert!(!other.running);
    assert_eq!(other.last.run_id, None);
    assert_eq!(other.last.updated, None);
    assert_eq!(other.last.ok, 0);
    assert_eq!(other.all.ok, 0);
}

#[test]
fn test_config_drives_timeout_and_accounting() {
    let config = parse_config(
        r#"
[ledger]
database-path = "unused.db"
running-timeout-minutes = 10
stub-accounting = "exclude-markers"
"#,
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut ledger = Ledger::with_config(SqliteStore::new_in_memory().unwrap(), &config.ledger)
        .with_clock(clock.clone());
    let collection_id = ledger.create_collection("gazettes").unwrap();

    ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
    assert_eq!(ledger.timeout(), Duration::minutes(10));

    clock.advance(Duration::minutes(11));
    let stats = ledger.stats("crawlerA").unwrap();
    assert!(!stats.running);
    assert_eq!(stats.last.ok, 0);
}

#[test]
fn test_descriptor_file_roundtrip_through_ledger() {
    let dir = TempDir::new().unwrap();
    let descriptor_path = dir.path().join("item.json");
    std::fs::write(
        &descriptor_path,
        r#"{
            "crawler": "crawlerA",
            "crawler_run": "run1",
            "foreign_id": "doc-9",
            "attributes": {"title": "Notice", "source": {"url": "https://example.org/9"}}
        }"#,
    )
    .unwrap();

    let descriptor = ItemDescriptor::from_json_file(&descriptor_path).unwrap();
    let mut ledger = Ledger::open(&create_test_config(&dir)).unwrap();
    let collection_id = ledger.create_collection("gazettes").unwrap();
    let record = ledger.record_success(&descriptor, collection_id).unwrap();

    let json = serde_json::to_string(&record.to_map().unwrap()).unwrap();
    let restored: OutcomeRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, record);

    let metadata = restored.metadata.unwrap();
    assert_eq!(metadata["source.url"], "https://example.org/9");
    assert_eq!(metadata["crawler_run"], "run1");
    assert!(!metadata.contains_key("content_hash"));
}

fn open_worker_ledger(path: &Path) -> Ledger<SqliteStore> {
    Ledger::new(SqliteStore::new(path).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reporters_get_unique_ids() {
    const WORKERS: usize = 4;
    const ITEMS_PER_WORKER: usize = 25;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("ledger.db");

    let collection_id = {
        let mut ledger = open_worker_ledger(&db_path);
        let collection_id = ledger.create_collection("gazettes").unwrap();
        ledger.record_stub(collection_id, "crawlerA", "run1").unwrap();
        collection_id
    };

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let db_path = db_path.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut ledger = open_worker_ledger(&db_path);
            let mut ids = Vec::new();
            for n in 0..ITEMS_PER_WORKER {
                let descriptor = item("run1", &format!("w{}-doc-{}", worker, n));
                let record = if n % 5 == 0 {
                    ledger
                        .record_failure(&descriptor, collection_id, Some("Timeout"), None, None)
                        .unwrap()
                } else {
                    ledger.record_success(&descriptor, collection_id).unwrap()
                };
                ids.push(record.id);
            }
            ids
        }));
    }

    let mut all_ids = HashSet::new();
    for handle in handles {
        let ids = handle.await.unwrap();
        // Each worker sees its own inserts in increasing id order
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        all_ids.extend(ids);
    }
    assert_eq!(all_ids.len(), WORKERS * ITEMS_PER_WORKER);

    let ledger = open_worker_ledger(&db_path);
    let listed = ledger.list_all().unwrap();
    assert_eq!(listed.len(), WORKERS * ITEMS_PER_WORKER + 1);
    assert!(listed.windows(2).all(|pair| pair[0].id < pair[1].id));

    let stats = ledger.stats("crawlerA").unwrap();
    let failures = (WORKERS * ITEMS_PER_WORKER / 5) as u64;
    assert!(stats.running);
    assert_eq!(stats.last.fail, failures);
    assert_eq!(stats.last.ok, (WORKERS * ITEMS_PER_WORKER) as u64 - failures);
}

#[test]
fn test_delete_collection_while_another_connection_appends() {
    const ROUNDS: usize = 200;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("ledger.db");

    let steady_collection = {
        let mut ledger = open_worker_ledger(&db_path);
        ledger.create_collection("steady").unwrap()
    };

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let db_path = db_path.clone();
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            let mut ledger = open_worker_ledger(&db_path);
            let mut inserts = 0usize;
            while !done.load(Ordering::Relaxed) {
                let descriptor = item("run1", &format!("doc-{}", inserts));
                ledger.record_success(&descriptor, steady_collection).unwrap();
                inserts += 1;
            }
            inserts
        })
    };

    let mut ledger = open_worker_ledger(&db_path);
    for round in 0..ROUNDS {
        let collection_id = ledger.create_collection(&format!("batch-{}", round)).unwrap();
        ledger.record_stub(collection_id, "crawlerB", "run1").unwrap();
        assert_eq!(ledger.delete_collection(collection_id).unwrap(), 1);
    }

    done.store(true, Ordering::Relaxed);
    let inserts = writer.join().unwrap();

    assert_eq!(ledger.list_for_crawler("crawlerB").unwrap().len(), 0);
    assert_eq!(ledger.list_for_collection(steady_collection).unwrap().len(), inserts);
}
