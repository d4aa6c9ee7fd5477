//! Lazy traversal of a date partition.
//!
//! [`FileCollector`] walks one date directory and yields a [`FileDescriptor`]
//! per regular file as the walk progresses. Nothing beyond the current
//! directory's entries is held in memory, so partitions with tens of thousands
//! of files cost the same as small ones.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::fs::checksum::hash_path;

/// Bounded channel depth between the blocking walker and the async consumer.
pub const SCAN_CHANNEL_CAPACITY: usize = 256;

/// One local file queued for possible transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Full path to the local file
    pub local_path: PathBuf,

    /// Destination key in the remote store
    pub remote_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified time, milliseconds since Unix epoch
    pub modified_ms: i64,

    /// Content digest, present only when hashing actually ran
    pub checksum: Option<String>,
}

impl FileDescriptor {
    /// Copy of this descriptor carrying `checksum`.
    pub fn with_checksum(&self, checksum: String) -> Self {
        Self {
            checksum: Some(checksum),
            ..self.clone()
        }
    }
}

/// A file the walk found but could not describe.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{path}: {message}")]
pub struct CollectError {
    pub path: String,
    pub message: String,
}

/// Map a local path under `cache_root` to its remote key: `<prefix>/<relative path>`.
///
/// Separators are normalised to `/` whatever the host platform.
pub fn remote_path_for(cache_root: &Path, local_path: &Path, prefix: &str) -> String {
    let relative = local_path.strip_prefix(cache_root).unwrap_or(local_path);
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Walks a single date partition.
#[derive(Debug, Clone)]
pub struct FileCollector {
    cache_root: PathBuf,
    remote_prefix: String,
    compute_checksums: bool,
}

impl FileCollector {
    pub fn new(cache_root: impl Into<PathBuf>, remote_prefix: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            remote_prefix: remote_prefix.into(),
            compute_checksums: false,
        }
    }

    /// Attach a content digest to every yielded descriptor.
    pub fn with_checksums(mut self, compute_checksums: bool) -> Self {
        self.compute_checksums = compute_checksums;
        self
    }

    /// Start walking `partition_dir`. The returned iterator is single-pass.
    pub fn collect(&self, partition_dir: &Path) -> FileIter {
        let walker = WalkDir::new(partition_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        FileIter {
            walker,
            collector: self.clone(),
        }
    }

    /// Run the walk on the blocking pool and stream results over a bounded channel.
    ///
    /// The walker only advances while the consumer keeps up, so at most
    /// [`SCAN_CHANNEL_CAPACITY`] descriptors are buffered at a time.
    pub fn spawn(
        &self,
        partition_dir: &Path,
    ) -> mpsc::Receiver<Result<FileDescriptor, CollectError>> {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let iter = self.collect(partition_dir);

        tokio::task::spawn_blocking(move || {
            for item in iter {
                // Receiver gone means the consumer stopped early
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        rx
    }

    fn describe(&self, entry: &DirEntry) -> Result<FileDescriptor, CollectError> {
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| CollectError {
            path: path.display().to_string(),
            message: format!("stat failed: {}", e),
        })?;

        let modified_ms = metadata
            .modified()
            .map_err(|e| CollectError {
                path: path.display().to_string(),
                message: format!("no modification time: {}", e),
            })?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let checksum = if self.compute_checksums {
            Some(hash_path(path).map_err(|e| CollectError {
                path: path.display().to_string(),
                message: format!("hash failed: {}", e),
            })?)
        } else {
            None
        };

        Ok(FileDescriptor {
            local_path: path.to_path_buf(),
            remote_path: remote_path_for(&self.cache_root, path, &self.remote_prefix),
            size: metadata.len(),
            modified_ms,
            checksum,
        })
    }
}

/// Single-pass sequence of descriptors for one partition.
pub struct FileIter {
    walker: walkdir::IntoIter,
    collector: FileCollector,
}

impl Iterator for FileIter {
    type Item = Result<FileDescriptor, CollectError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    return Some(Err(CollectError {
                        path,
                        message: e.to_string(),
                    }));
                }
            };

            // Directories, symlinks, sockets and the like are not transferable
            if !entry.file_type().is_file() {
                if entry.file_type().is_symlink() {
                    debug!("Skipping symlink: {}", entry.path().display());
                }
                continue;
            }

            return Some(self.collector.describe(&entry));
        }
    }
}
