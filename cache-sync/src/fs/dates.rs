//! Date-partition selection and discovery.
//!
//! The cache root holds one directory per calendar day (`YYYY-MM-DD`). Selection
//! is a pure lexicographic filter; discovery is a single directory listing.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Layout of a date-partition directory name.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Select the dates `d` with `since <= d <= until`, in ascending order.
///
/// A missing bound is unbounded on that side. Inputs are assumed to be valid
/// `YYYY-MM-DD` strings, which compare correctly as plain strings; bound
/// validation happens before this is called.
pub fn filter_dates<'a, I>(dates: I, since: Option<&str>, until: Option<&str>) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut selected: Vec<String> = dates
        .into_iter()
        .filter(|d| since.map_or(true, |s| d.as_str() >= s))
        .filter(|d| until.map_or(true, |u| d.as_str() <= u))
        .cloned()
        .collect();
    selected.sort();
    selected.dedup();
    selected
}

/// True if `name` is a well-formed `YYYY-MM-DD` calendar date.
pub fn is_date_name(name: &str) -> bool {
    name.len() == 10 && NaiveDate::parse_from_str(name, DATE_FORMAT).is_ok()
}

/// Source of the candidate date partitions under a cache root.
#[async_trait]
pub trait DateSource: Send + Sync {
    async fn list_dates(&self, cache_root: &Path) -> std::io::Result<BTreeSet<String>>;
}

/// Lists the immediate subdirectories of the cache root named like dates.
#[derive(Debug, Clone, Default)]
pub struct DirectoryDateSource;

#[async_trait]
impl DateSource for DirectoryDateSource {
    async fn list_dates(&self, cache_root: &Path) -> std::io::Result<BTreeSet<String>> {
        let mut dates = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(cache_root).await?;

        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks, so linked dirs are ignored
            let file_type = entry.file_type().await?;
            if !file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if is_date_name(&name) {
                dates.insert(name);
            } else {
                debug!("Ignoring non-date directory: {}", name);
            }
        }

        Ok(dates)
    }
}
