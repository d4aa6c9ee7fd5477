//! Configuration management for the cache uploader.
//!
//! Loads configuration from a TOML file. Every field has a default, so a partial
//! file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::store::DEFAULT_MANIFEST_FILE;
use crate::sync::options::{DEFAULT_CONCURRENCY, DEFAULT_REMOTE_PREFIX};
use crate::utils::{Result, SyncError};

/// Environment variable that overrides `store.token`.
pub const TOKEN_ENV_VAR: &str = "CACHE_SYNC_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL objects are PUT under
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token, if the store requires one
    #[serde(default)]
    pub token: Option<String>,

    /// Key prefix for every uploaded object
    #[serde(default = "default_remote_prefix")]
    pub remote_prefix: String,

    /// Per-request timeout; unset keeps the HTTP client's default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding one subdirectory per date
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Concurrent uploads per date
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Skip files already recorded in the manifest
    #[serde(default = "default_incremental")]
    pub incremental: bool,

    /// Manifest file name beneath the cache root
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_remote_prefix() -> String {
    DEFAULT_REMOTE_PREFIX.to_string()
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_incremental() -> bool {
    true
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            remote_prefix: default_remote_prefix(),
            timeout_secs: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            concurrency: default_concurrency(),
            incremental: default_incremental(),
            manifest_file: default_manifest_file(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("invalid {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                self.store.token = Some(token);
            }
        }
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.concurrency, 10);
        assert!(config.sync.incremental);
        assert_eq!(config.sync.cache_root, PathBuf::from("./cache"));
        assert_eq!(config.sync.manifest_file, ".sync-manifest.json");
        assert_eq!(config.store.remote_prefix, "cache");
        assert_eq!(config.log.level, "info");
        assert!(config.store_timeout().is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            endpoint = "https://objects.example.com/bucket"
            timeout_secs = 30

            [sync]
            concurrency = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.store.endpoint, "https://objects.example.com/bucket");
        assert_eq!(config.store_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.sync.concurrency, 4);
        assert!(config.sync.incremental);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_load_written_config() {
        let mut config = Config::default();
        config.store.token = Some("secret".to_string());
        config.sync.cache_root = PathBuf::from("/srv/stats/cache");

        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.store.token.as_deref(), Some("secret"));
        assert_eq!(loaded.sync.cache_root, PathBuf::from("/srv/stats/cache"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[sync\nconcurrency = ").unwrap();
        assert!(matches!(
            Config::from_file(temp_file.path()),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Config::from_file(Path::new("/nonexistent/cache-sync.toml"));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
