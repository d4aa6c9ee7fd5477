//! Command-line arguments and their validation into [`UploadOptions`].

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::fs::dates::DATE_FORMAT;
use crate::sync::options::{DateScope, UploadOptions};
use crate::utils::{Result, SyncError};

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache root (overrides config)
    #[arg(long, value_name = "DIR")]
    pub cache_root: Option<PathBuf>,

    /// Upload a single date (YYYY-MM-DD)
    #[arg(short, long, conflicts_with_all = ["since", "until"])]
    pub date: Option<String>,

    /// First date to upload, inclusive
    #[arg(long)]
    pub since: Option<String>,

    /// Last date to upload, inclusive
    #[arg(long)]
    pub until: Option<String>,

    /// Upload every file, ignoring the manifest
    #[arg(long)]
    pub full: bool,

    /// Classify and report without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Concurrent uploads per date (overrides config)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

fn parse_date(flag: &str, value: &str) -> Result<String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .filter(|_| value.len() == 10)
        .map(|_| value.to_string())
        .ok_or_else(|| {
            SyncError::InvalidOptions(format!("--{} must be YYYY-MM-DD, got '{}'", flag, value))
        })
}

impl Args {
    /// Merge with `config` and validate.
    pub fn into_options(self, config: &Config) -> Result<UploadOptions> {
        if self.date.is_some() && (self.since.is_some() || self.until.is_some()) {
            return Err(SyncError::InvalidOptions(
                "--date cannot be combined with --since/--until".to_string(),
            ));
        }

        let scope = match (&self.date, &self.since, &self.until) {
            (Some(date), _, _) => DateScope::Single(parse_date("date", date)?),
            (None, None, None) => DateScope::All,
            (None, since, until) => {
                let since = since.as_deref().map(|s| parse_date("since", s)).transpose()?;
                let until = until.as_deref().map(|u| parse_date("until", u)).transpose()?;
                if let (Some(s), Some(u)) = (&since, &until) {
                    if s > u {
                        return Err(SyncError::InvalidOptions(format!(
                            "--since {} is after --until {}",
                            s, u
                        )));
                    }
                }
                DateScope::Range { since, until }
            }
        };

        let concurrency = self.concurrency.unwrap_or(config.sync.concurrency);
        if concurrency == 0 {
            return Err(SyncError::InvalidOptions(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(UploadOptions {
            scope,
            incremental: config.sync.incremental && !self.full,
            dry_run: self.dry_run,
            concurrency,
            cache_root: self.cache_root.unwrap_or_else(|| config.sync.cache_root.clone()),
            remote_prefix: config.store.remote_prefix.clone(),
            manifest_file: config.sync.manifest_file.clone(),
        })
    }
}
