//! Outcome record definitions for the run state ledger
//!
//! This module defines the immutable log entry written for every processed
//! item and for every run-start marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat attribute mapping describing a processed item
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// `error_type` carried by run-start marker records
pub const INIT_ERROR_TYPE: &str = "init";

/// Stored status of an outcome record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Item processed successfully (also used by run-start markers)
    Ok,

    /// Item processing failed
    Fail,
}

impl OutcomeStatus {
    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// What a record actually means, with run-start markers told apart from successes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Run-start marker written before any item completes
    Started,

    /// Genuine item success
    Ok,

    /// Item failure
    Fail,
}

/// An outcome record waiting to be appended to the ledger
///
/// `id` and `created_at` are assigned by the store at insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutcome {
    pub collection_id: i64,
    pub crawler_id: String,
    pub crawler_run: Option<String>,
    pub content_hash: Option<String>,
    pub foreign_id: Option<String>,
    pub status: OutcomeStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub metadata: Option<Metadata>,
}

impl NewOutcome {
    /// Builds the run-start marker for `crawler_run`
    pub fn stub(collection_id: i64, crawler_id: &str, crawler_run: &str) -> Self {
        Self {
            collection_id,
            crawler_id: crawler_id.to_string(),
            crawler_run: Some(crawler_run.to_string()),
            content_hash: None,
            foreign_id: None,
            status: OutcomeStatus::Ok,
            error_type: Some(INIT_ERROR_TYPE.to_string()),
            error_message: None,
            error_details: None,
            metadata: None,
        }
    }
}

/// One immutable entry in the ledger
///
/// The serialized form is the twelve-field projection every wire format
/// must preserve. Absent optionals serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: i64,
    pub status: OutcomeStatus,
    pub crawler_id: String,
    pub crawler_run: Option<String>,
    pub content_hash: Option<String>,
    pub foreign_id: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub metadata: Option<Metadata>,
    pub collection_id: i64,
    pub created_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Attaches the store-assigned identity to a pending outcome
    pub fn from_new(id: i64, created_at: DateTime<Utc>, outcome: NewOutcome) -> Self {
        Self {
            id,
            status: outcome.status,
            crawler_id: outcome.crawler_id,
            crawler_run: outcome.crawler_run,
            content_hash: outcome.content_hash,
            foreign_id: outcome.foreign_id,
            error_type: outcome.error_type,
            error_message: outcome.error_message,
            error_details: outcome.error_details,
            metadata: outcome.metadata,
            collection_id: outcome.collection_id,
            created_at,
        }
    }

    /// Returns true if this is a run-start marker rather than an item outcome
    pub fn is_stub(&self) -> bool {
        self.status == OutcomeStatus::Ok && self.error_type.as_deref() == Some(INIT_ERROR_TYPE)
    }

    pub fn kind(&self) -> RecordKind {
        match self.status {
            OutcomeStatus::Ok if self.is_stub() => RecordKind::Started,
            OutcomeStatus::Ok => RecordKind::Ok,
            OutcomeStatus::Fail => RecordKind::Fail,
        }
    }

    /// Projects the record into a flat key/value mapping
    pub fn to_map(&self) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "record projected to non-object value: {}",
                other
            ))),
        }
    }

    /// Rebuilds a record from its flat projection
    pub fn from_map(
        map: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(map))
    }
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<OutcomeRecord({}, {})>", self.id, self.status)
    }
}
