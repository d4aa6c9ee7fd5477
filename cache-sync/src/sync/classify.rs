//! Change detection against the manifest.
//!
//! Size and mtime are compared first; a match means the file is skipped without
//! touching its content. Only when metadata has drifted is the file hashed and
//! its digest compared with the recorded checksum.

use std::sync::Arc;
use tracing::debug;

use crate::fs::checksum::ContentHasher;
use crate::fs::walker::FileDescriptor;
use crate::manifest::{Manifest, ManifestEntry};

/// Why a file does not need transferring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Size and mtime equal the manifest's
    MetadataMatch,
    /// Metadata drifted but the content digest is unchanged
    ContentMatch,
}

/// Why a file must be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    /// Incremental mode is off
    Unconditional,
    /// No manifest entry for the remote path
    New,
    /// Digest differs from the manifest's
    ContentChanged,
    /// Metadata drifted and hashing was not permitted (dry run)
    MetadataChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Skip(SkipReason),
    Upload(UploadReason),
}

impl Classification {
    pub fn is_skip(&self) -> bool {
        matches!(self, Classification::Skip(_))
    }
}

/// Outcome for one file. `descriptor` carries a checksum if hashing ran.
#[derive(Debug, Clone)]
pub struct Decision {
    pub classification: Classification,
    pub descriptor: FileDescriptor,
}

/// True when size and mtime both equal the recorded values.
pub fn metadata_matches(descriptor: &FileDescriptor, entry: &ManifestEntry) -> bool {
    descriptor.size == entry.size && descriptor.modified_ms == entry.modified_ms
}

pub struct FastPathClassifier {
    hasher: Arc<dyn ContentHasher>,
    incremental: bool,
    allow_hash: bool,
}

impl FastPathClassifier {
    pub fn new(hasher: Arc<dyn ContentHasher>, incremental: bool, allow_hash: bool) -> Self {
        Self {
            hasher,
            incremental,
            allow_hash,
        }
    }

    /// Classify one file. Errors only come from hashing.
    pub async fn classify(
        &self,
        descriptor: FileDescriptor,
        manifest: &Manifest,
    ) -> std::io::Result<Decision> {
        if !self.incremental {
            return Ok(Decision {
                classification: Classification::Upload(UploadReason::Unconditional),
                descriptor,
            });
        }

        let entry = match manifest.get(&descriptor.remote_path) {
            Some(entry) => entry,
            None => {
                return Ok(Decision {
                    classification: Classification::Upload(UploadReason::New),
                    descriptor,
                })
            }
        };

        if metadata_matches(&descriptor, entry) {
            return Ok(Decision {
                classification: Classification::Skip(SkipReason::MetadataMatch),
                descriptor,
            });
        }

        if !self.allow_hash {
            return Ok(Decision {
                classification: Classification::Upload(UploadReason::MetadataChanged),
                descriptor,
            });
        }

        let checksum = self.hasher.hash_file(&descriptor.local_path).await?;
        let classification = if checksum == entry.checksum {
            Classification::Skip(SkipReason::ContentMatch)
        } else {
            Classification::Upload(UploadReason::ContentChanged)
        };
        debug!(
            "Metadata drift on {}: {:?}",
            descriptor.remote_path, classification
        );

        Ok(Decision {
            classification,
            descriptor: descriptor.with_checksum(checksum),
        })
    }
}
