//! Persistence for the upload manifest.
//!
//! Saves go to a sibling temp file which is then renamed over the real one, so
//! a reader (or a crashed run) only ever sees a complete manifest.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{Manifest, SCHEMA_VERSION};
use crate::utils::Result;

/// Default manifest location relative to the cache root.
pub const DEFAULT_MANIFEST_FILE: &str = ".sync-manifest.json";

/// Loads and atomically saves the manifest for one cache root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<cache_root>/<file_name>`.
    pub fn for_cache_root(cache_root: &Path, file_name: &str) -> Self {
        Self::new(cache_root.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the in-progress write, in the same directory as the manifest.
    pub fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_MANIFEST_FILE.to_string());
        self.path.with_file_name(format!("{}.tmp", name))
    }

    /// Read the persisted manifest.
    ///
    /// A missing, unreadable or foreign-schema file yields an empty manifest:
    /// every file is then treated as new.
    pub async fn load(&self) -> Manifest {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No manifest at {}, starting empty", self.path.display());
                return Manifest::new();
            }
            Err(e) => {
                warn!("Failed to read manifest {}: {}", self.path.display(), e);
                return Manifest::new();
            }
        };

        match serde_json::from_slice::<Manifest>(&data) {
            Ok(manifest) if manifest.schema_version == SCHEMA_VERSION => {
                info!("Loaded manifest: {} entries", manifest.len());
                manifest
            }
            Ok(manifest) => {
                warn!(
                    "Manifest schema {} is not {}, starting empty",
                    manifest.schema_version, SCHEMA_VERSION
                );
                Manifest::new()
            }
            Err(e) => {
                warn!("Failed to parse manifest {}: {}", self.path.display(), e);
                Manifest::new()
            }
        }
    }

    /// Persist `manifest`, retrying once on failure.
    ///
    /// Returns the error of the second attempt if both fail; the previous
    /// manifest file is left as it was.
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        match self.write_atomic(manifest).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("Manifest save failed, retrying once: {}", first);
                self.write_atomic(manifest).await
            }
        }
    }

    async fn write_atomic(&self, manifest: &Manifest) -> Result<()> {
        let data = serde_json::to_vec(manifest)?;
        let temp_path = self.temp_path();

        if let Err(e) = self.write_temp(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!(
            "Saved manifest: {} entries -> {}",
            manifest.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn write_temp(&self, temp_path: &Path, data: &[u8]) -> Result<()> {
        let mut file = tokio::fs::File::create(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}
