//! Run summary returned to the caller.

use serde::Serialize;

/// One per-file failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
    pub timestamp: String,
}

/// Per-bucket counters.
///
/// `files_processed == files_uploaded + files_failed + files_skipped` always
/// holds. Files that were never started because the run was aborted are
/// outside all three buckets and counted in `files_not_started` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCounts {
    pub files_processed: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub files_not_started: usize,
}

impl SummaryCounts {
    pub fn uploaded(&mut self) {
        self.files_processed += 1;
        self.files_uploaded += 1;
    }

    pub fn failed(&mut self) {
        self.files_processed += 1;
        self.files_failed += 1;
    }

    pub fn skipped(&mut self) {
        self.files_processed += 1;
        self.files_skipped += 1;
    }

    pub fn not_started(&mut self) {
        self.files_not_started += 1;
    }

    pub fn is_consistent(&self) -> bool {
        self.files_processed == self.files_uploaded + self.files_failed + self.files_skipped
    }
}

/// Final result of one upload run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub run_id: String,
    #[serde(flatten)]
    pub counts: SummaryCounts,
    /// Dates actually processed, in order
    pub dates_processed: Vec<String>,
    pub errors: Vec<FileError>,
    /// The run stopped because the remote store rejected our credentials
    pub auth_error: bool,
    /// The manifest could not be persisted after one retry
    pub manifest_write_error: bool,
    /// Stopped early by an external cancellation rather than an auth failure
    pub cancelled: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl UploadSummary {
    pub fn files_processed(&self) -> usize {
        self.counts.files_processed
    }

    pub fn files_uploaded(&self) -> usize {
        self.counts.files_uploaded
    }

    pub fn files_failed(&self) -> usize {
        self.counts.files_failed
    }

    pub fn files_skipped(&self) -> usize {
        self.counts.files_skipped
    }

    /// True when nothing went wrong.
    pub fn is_clean(&self) -> bool {
        !self.auth_error && !self.manifest_write_error && self.counts.files_failed == 0
    }
}
