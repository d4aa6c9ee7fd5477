//! Custom error types for the cache uploader.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("No date partitions found under {root} for {scope}")]
    NoDatesFound { root: String, scope: String },

    #[error("No files found under {root} for {scope}")]
    NoFilesFound { root: String, scope: String },

    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            SyncError::Task(format!("task panicked: {}", e))
        } else {
            SyncError::Task(format!("task cancelled: {}", e))
        }
    }
}

impl SyncError {
    /// True when the requested scope had nothing to upload.
    pub fn is_no_work(&self) -> bool {
        matches!(self, SyncError::NoDatesFound { .. } | SyncError::NoFilesFound { .. })
    }

    /// True when the failure came from the remote store refusing our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_auth())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
