//! Utility modules for the cache uploader.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
