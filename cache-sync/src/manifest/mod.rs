//! Manifest types for incremental upload support.
//!
//! The manifest records, per remote path, the state of the last upload the
//! remote store confirmed. It is persisted as JSON beneath the cache root and
//! lets a later run skip files whose size and mtime have not moved.

pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use store::ManifestStore;

/// Schema version written to, and required from, the persisted manifest.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Upload ledger keyed by remote path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: String,
    pub entries: HashMap<String, ManifestEntry>,
}

/// Last confirmed remote state for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub checksum: String,
    pub size: u64,
    #[serde(rename = "mtimeMs")]
    pub modified_ms: i64,
    /// ISO-8601 timestamp of the confirming upload
    pub uploaded_at: String,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, remote_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(remote_path)
    }

    /// Record a confirmed upload, replacing any earlier entry for the path.
    pub fn record(&mut self, remote_path: String, entry: ManifestEntry) {
        self.entries.insert(remote_path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}
