//! Remote object store abstraction.
//!
//! The uploader only ever writes: a put of a byte stream under a path, with a
//! content type and string metadata. Change detection never consults the
//! remote side, so there is no read or list operation.

pub mod digest_stream;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

pub use digest_stream::{DigestHandle, DigestStream};
pub use http::HttpObjectStore;
pub use memory::MemoryStore;

/// Streamed request body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Failures reported by an [`ObjectStore`].
///
/// Authentication problems have their own variants so callers can tell them
/// apart without looking at messages.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for credential failures, which abort the whole run.
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_) | StoreError::Forbidden(_))
    }
}

/// One object write.
pub struct PutRequest {
    pub remote_path: String,
    pub body: ByteStream,
    pub content_length: u64,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl std::fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutRequest")
            .field("remote_path", &self.remote_path)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Write-only destination for file content.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, request: PutRequest) -> Result<(), StoreError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Content type for a cached file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => "text/csv",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_variants() {
        assert!(StoreError::Unauthorized("x".into()).is_auth());
        assert!(StoreError::Forbidden("x".into()).is_auth());
        assert!(!StoreError::Rejected { status: 500, message: "x".into() }.is_auth());
        assert!(!StoreError::Transport("x".into()).is_auth());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/rank.csv")), "text/csv");
        assert_eq!(content_type_for(Path::new("a/RANK.CSV")), "text/csv");
        assert_eq!(content_type_for(Path::new("snapshot.json")), "application/json");
        assert_eq!(content_type_for(Path::new("page.html")), "text/html");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
