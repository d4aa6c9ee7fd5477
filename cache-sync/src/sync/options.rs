//! Validated options for one upload run.

use std::fmt;
use std::path::PathBuf;

use crate::manifest::store::DEFAULT_MANIFEST_FILE;

/// Default number of concurrent uploads per date.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default key prefix in the remote store.
pub const DEFAULT_REMOTE_PREFIX: &str = "cache";

/// Which date partitions a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateScope {
    /// Every partition under the cache root
    All,
    /// Exactly one day
    Single(String),
    /// Inclusive range; a missing bound is open on that side
    Range {
        since: Option<String>,
        until: Option<String>,
    },
}

impl DateScope {
    /// `(since, until)` bounds for the date filter.
    pub fn bounds(&self) -> (Option<&str>, Option<&str>) {
        match self {
            DateScope::All => (None, None),
            DateScope::Single(date) => (Some(date.as_str()), Some(date.as_str())),
            DateScope::Range { since, until } => (since.as_deref(), until.as_deref()),
        }
    }
}

impl fmt::Display for DateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateScope::All => write!(f, "all dates"),
            DateScope::Single(date) => write!(f, "{}", date),
            DateScope::Range { since, until } => write!(
                f,
                "{}..{}",
                since.as_deref().unwrap_or(""),
                until.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Options the engine trusts as already validated.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub scope: DateScope,
    /// Skip files the manifest shows as already uploaded
    pub incremental: bool,
    /// Classify and report only; no uploads, no manifest writes
    pub dry_run: bool,
    /// Upload tasks in flight per date
    pub concurrency: usize,
    pub cache_root: PathBuf,
    pub remote_prefix: String,
    /// Manifest file name beneath the cache root
    pub manifest_file: String,
}

impl UploadOptions {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            scope: DateScope::All,
            incremental: true,
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            cache_root: cache_root.into(),
            remote_prefix: DEFAULT_REMOTE_PREFIX.to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
        }
    }

    /// Whether the run is allowed to hash file content.
    pub fn may_hash(&self) -> bool {
        self.incremental && !self.dry_run
    }
}
