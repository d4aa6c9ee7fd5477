//! Progress reporting hooks.
//!
//! The orchestrator calls a [`ProgressReporter`] synchronously from its own
//! task, so date events arrive in processing order. Rendering for humans is the
//! caller's business; [`LogReporter`] just writes to the log and
//! [`ChannelReporter`] forwards events to another task.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::summary::SummaryCounts;

/// Outcome reported for an individual file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploaded,
    Failed,
    /// Dry run: the file would have been uploaded
    WouldUpload,
}

pub trait ProgressReporter: Send + Sync {
    /// A date finished; `index` is 1-based.
    fn on_date_complete(&self, index: usize, total: usize, date: &str, file_count: usize);

    fn on_file_uploaded(&self, remote_path: &str, status: FileStatus);

    fn on_complete(&self, counts: &SummaryCounts);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_date_complete(&self, _index: usize, _total: usize, _date: &str, _file_count: usize) {}
    fn on_file_uploaded(&self, _remote_path: &str, _status: FileStatus) {}
    fn on_complete(&self, _counts: &SummaryCounts) {}
}

/// Writes progress to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn on_date_complete(&self, index: usize, total: usize, date: &str, file_count: usize) {
        let percent = if total > 0 {
            (index as f64 / total as f64) * 100.0
        } else {
            100.0
        };
        info!("[{}/{}] {} done: {} files ({:.1}%)", index, total, date, file_count, percent);
    }

    fn on_file_uploaded(&self, remote_path: &str, status: FileStatus) {
        debug!("{:?}: {}", status, remote_path);
    }

    fn on_complete(&self, counts: &SummaryCounts) {
        info!(
            "Upload finished: {} processed, {} uploaded, {} skipped, {} failed, {} not started",
            counts.files_processed,
            counts.files_uploaded,
            counts.files_skipped,
            counts.files_failed,
            counts.files_not_started
        );
    }
}

/// Progress event as sent by [`ChannelReporter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    DateComplete {
        index: usize,
        total: usize,
        date: String,
        file_count: usize,
    },
    FileUploaded {
        remote_path: String,
        status: FileStatus,
    },
    Complete {
        counts: SummaryCounts,
    },
}

/// Forwards events over an unbounded channel; send order is event order.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_date_complete(&self, index: usize, total: usize, date: &str, file_count: usize) {
        self.send(ProgressEvent::DateComplete {
            index,
            total,
            date: date.to_string(),
            file_count,
        });
    }

    fn on_file_uploaded(&self, remote_path: &str, status: FileStatus) {
        self.send(ProgressEvent::FileUploaded {
            remote_path: remote_path.to_string(),
            status,
        });
    }

    fn on_complete(&self, counts: &SummaryCounts) {
        self.send(ProgressEvent::Complete { counts: *counts });
    }
}

/// Format milliseconds as a short human-readable duration.
pub fn format_duration_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    if seconds == 0 {
        format!("{}ms", ms)
    } else if seconds < 60 {
        format!("{}.{:01}s", seconds, (ms % 1000) / 100)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
