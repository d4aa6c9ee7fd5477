//! Cache Sync Library
//!
//! Incremental uploader for a date-partitioned file cache: per-date scanning,
//! manifest-based change detection and bounded-concurrency uploads to an
//! object store.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod manifest;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use store::{MemoryStore, ObjectStore};
pub use sync::{SyncEngine, UploadOptions, UploadSummary};
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
