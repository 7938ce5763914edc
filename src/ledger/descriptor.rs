//! Item descriptors and metadata flattening
//!
//! An [`ItemDescriptor`] is what a crawler hands over when an item finishes.
//! A [`MetadataFlattener`] turns it into the flat attribute mapping stored on
//! the outcome record.

use crate::ledger::record::Metadata;
use crate::LedgerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Description of one processed item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Logical crawler that produced the item
    pub crawler: String,

    /// Run of that crawler, if any
    #[serde(default)]
    pub crawler_run: Option<String>,

    /// External identifier of the item
    #[serde(default)]
    pub foreign_id: Option<String>,

    /// Content fingerprint of the item
    #[serde(default)]
    pub content_hash: Option<String>,

    /// Free-form attributes (title, source URL, mime type, ...)
    #[serde(default)]
    pub attributes: Metadata,
}

impl ItemDescriptor {
    pub fn new(crawler: impl Into<String>) -> Self {
        Self {
            crawler: crawler.into(),
            ..Self::default()
        }
    }

    pub fn with_run(mut self, crawler_run: impl Into<String>) -> Self {
        self.crawler_run = Some(crawler_run.into());
        self
    }

    pub fn with_foreign_id(mut self, foreign_id: impl Into<String>) -> Self {
        self.foreign_id = Some(foreign_id.into());
        self
    }

    pub fn with_content_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = Some(content_hash.into());
        self
    }

    /// Sets the content hash to the SHA-256 of `content`
    pub fn with_content(self, content: &[u8]) -> Self {
        self.with_content_hash(content_hash(content))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Parses a descriptor from JSON text
    pub fn from_json(text: &str) -> Result<Self, LedgerError> {
        let descriptor: Self = serde_json::from_str(text)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Checks that the descriptor names a crawler
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_crawler_id(&self.crawler)
    }

    /// Reads a descriptor from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, LedgerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Rejects empty or whitespace-only crawler ids
pub fn validate_crawler_id(crawler_id: &str) -> Result<(), LedgerError> {
    if crawler_id.trim().is_empty() {
        return Err(LedgerError::Descriptor(
            "crawler cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Computes the hex-encoded SHA-256 fingerprint of item content
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Computes the content fingerprint of a file on disk
pub fn content_hash_file(path: &Path) -> Result<String, LedgerError> {
    let content = std::fs::read(path)?;
    Ok(content_hash(&content))
}

/// Converts an item descriptor into the metadata stored with its outcome
pub trait MetadataFlattener: Send + Sync {
    fn flatten(&self, item: &ItemDescriptor) -> Metadata;
}

/// Default flattener
///
/// Merges the identifier fields with the item attributes, flattens nested
/// objects into dotted keys (`source.url`) and drops null values. Arrays are
/// kept as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct DottedFlattener;

impl MetadataFlattener for DottedFlattener {
    fn flatten(&self, item: &ItemDescriptor) -> Metadata {
        let mut flat = Metadata::new();
        flatten_into(&mut flat, "", &item.attributes);

        // Identifier fields win over attributes of the same name
        flat.insert("crawler".to_string(), Value::from(item.crawler.clone()));
        let identifiers = [
            ("crawler_run", &item.crawler_run),
            ("foreign_id", &item.foreign_id),
            ("content_hash", &item.content_hash),
        ];
        for (key, value) in identifiers {
            match value {
                Some(value) => {
                    flat.insert(key.to_string(), Value::from(value.clone()));
                }
                None => {
                    flat.remove(key);
                }
            }
        }

        flat
    }
}

fn flatten_into(flat: &mut Metadata, prefix: &str, map: &Metadata) {
    for (key, value) in map {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Null => {}
            Value::Object(nested) => flatten_into(flat, &full_key, nested),
            other => {
                flat.insert(full_key, other.clone());
            }
        }
    }
}
