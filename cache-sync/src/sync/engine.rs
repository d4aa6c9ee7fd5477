//! Upload orchestrator.
//!
//! Dates are processed one at a time, in order. For each date the partition is
//! scanned and every file classified against the manifest as it arrives; the
//! files that must move are then uploaded through a [`ConcurrencyPool`]. Once
//! every task for the date has resolved, outcomes are folded into the manifest
//! (only here, never from inside a task) and the manifest is flushed before the
//! next date starts.

use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::classify::{Classification, FastPathClassifier};
use super::options::UploadOptions;
use super::pool::{ConcurrencyPool, TaskOutcome};
use super::progress::{format_duration_ms, FileStatus, LogReporter, ProgressReporter};
use super::summary::{FileError, SummaryCounts, UploadSummary};
use crate::fs::checksum::{Blake3Hasher, ContentHasher};
use crate::fs::dates::{filter_dates, DateSource, DirectoryDateSource};
use crate::fs::walker::{FileCollector, FileDescriptor};
use crate::manifest::{Manifest, ManifestEntry, ManifestStore};
use crate::store::{content_type_for, DigestStream, ObjectStore, PutRequest};
use crate::utils::{Result, SyncError};

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync {
    /// Current time as ISO-8601.
    fn now_iso(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_iso(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Mutable state of one run, owned by the driving task.
struct RunState {
    manifest: Manifest,
    manifest_dirty: bool,
    counts: SummaryCounts,
    errors: Vec<FileError>,
    auth_error: bool,
    manifest_write_error: bool,
    dates_processed: Vec<String>,
}

impl RunState {
    fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            manifest_dirty: false,
            counts: SummaryCounts::default(),
            errors: Vec::new(),
            auth_error: false,
            manifest_write_error: false,
            dates_processed: Vec::new(),
        }
    }

    fn record_failure(&mut self, file: &str, error: String, timestamp: String) {
        self.counts.failed();
        self.errors.push(FileError {
            file: file.to_string(),
            error,
            timestamp,
        });
    }
}

/// Drives upload runs against one object store.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    hasher: Arc<dyn ContentHasher>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ProgressReporter>,
    dates: Arc<dyn DateSource>,
    cancel_token: CancellationToken,
}

impl SyncEngine {
    /// Engine with BLAKE3 hashing, the system clock, log progress and
    /// directory-based date discovery.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            hasher: Arc::new(Blake3Hasher),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(LogReporter),
            dates: Arc::new(DirectoryDateSource),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_date_source(mut self, dates: Arc<dyn DateSource>) -> Self {
        self.dates = dates;
        self
    }

    /// Stop starting new work when `cancel_token` fires.
    ///
    /// Uploads already in flight still finish and the manifest is still
    /// flushed, exactly as for an authentication abort.
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Run one upload pass.
    ///
    /// Fails only when the cache root cannot be listed or the scope holds no
    /// dates or no files; every other problem is reported through the summary.
    pub async fn run(&self, options: &UploadOptions) -> Result<UploadSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("sync_run", run_id = %run_id);
        self.execute(run_id, options).instrument(span).await
    }

    async fn execute(&self, run_id: String, options: &UploadOptions) -> Result<UploadSummary> {
        let start_time = Instant::now();

        let available = self.dates.list_dates(&options.cache_root).await?;
        let (since, until) = options.scope.bounds();
        let dates = filter_dates(&available, since, until);
        if dates.is_empty() {
            return Err(SyncError::NoDatesFound {
                root: options.cache_root.display().to_string(),
                scope: options.scope.to_string(),
            });
        }

        info!(
            "Starting upload to {}: {} dates ({}), incremental={}, dry_run={}, concurrency={}",
            self.store.name(),
            dates.len(),
            options.scope,
            options.incremental,
            options.dry_run,
            options.concurrency
        );

        let manifest_store = ManifestStore::for_cache_root(&options.cache_root, &options.manifest_file);
        let mut run = RunState::new(manifest_store.load().await);

        // Auth failures cancel this token; an operator cancel reaches it through the parent
        let abort = self.cancel_token.child_token();
        let mut total_files = 0usize;

        for (idx, date) in dates.iter().enumerate() {
            if abort.is_cancelled() {
                warn!("Run aborted, not starting {} or later dates", date);
                break;
            }

            run.manifest_dirty = false;
            let file_count = self.sync_date(date, options, &mut run, &abort).await;
            total_files += file_count;
            run.dates_processed.push(date.clone());

            if run.manifest_dirty && !options.dry_run {
                if let Err(e) = manifest_store.save(&run.manifest).await {
                    error!("Failed to persist manifest after {}: {}", date, e);
                    run.manifest_write_error = true;
                }
            }

            self.reporter
                .on_date_complete(idx + 1, dates.len(), date, file_count);
        }

        if total_files == 0 && !abort.is_cancelled() {
            return Err(SyncError::NoFilesFound {
                root: options.cache_root.display().to_string(),
                scope: options.scope.to_string(),
            });
        }

        self.reporter.on_complete(&run.counts);

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Upload run finished in {}: {} uploaded, {} skipped, {} failed",
            format_duration_ms(duration_ms),
            run.counts.files_uploaded,
            run.counts.files_skipped,
            run.counts.files_failed
        );

        Ok(UploadSummary {
            run_id,
            counts: run.counts,
            dates_processed: run.dates_processed,
            errors: run.errors,
            auth_error: run.auth_error,
            manifest_write_error: run.manifest_write_error,
            cancelled: self.cancel_token.is_cancelled(),
            dry_run: options.dry_run,
            duration_ms,
        })
    }

    /// Scan, classify and upload one date partition. Returns the number of
    /// files found.
    async fn sync_date(
        &self,
        date: &str,
        options: &UploadOptions,
        run: &mut RunState,
        abort: &CancellationToken,
    ) -> usize {
        let partition_dir = options.cache_root.join(date);
        let collector = FileCollector::new(&options.cache_root, &options.remote_prefix);
        let classifier =
            FastPathClassifier::new(self.hasher.clone(), options.incremental, options.may_hash());

        let mut scan = collector.spawn(&partition_dir);
        let mut file_count = 0usize;
        let mut to_upload: Vec<FileDescriptor> = Vec::new();

        while let Some(item) = scan.recv().await {
            if abort.is_cancelled() {
                // Dropping the receiver stops the walker
                warn!("Run aborted, {} scan stopped after {} files", date, file_count);
                break;
            }
            file_count += 1;

            let descriptor = match item {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Scan failed for {}", e);
                    run.record_failure(&e.path, e.message, self.clock.now_iso());
                    continue;
                }
            };

            let remote_path = descriptor.remote_path.clone();
            let decision = match classifier.classify(descriptor, &run.manifest).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("Failed to hash {}: {}", remote_path, e);
                    run.record_failure(&remote_path, format!("hash failed: {}", e), self.clock.now_iso());
                    continue;
                }
            };

            match decision.classification {
                Classification::Skip(reason) => {
                    debug!("Skip {} ({:?})", remote_path, reason);
                    run.counts.skipped();
                }
                Classification::Upload(reason) if options.dry_run => {
                    debug!("Would upload {} ({:?})", remote_path, reason);
                    run.counts.skipped();
                    self.reporter
                        .on_file_uploaded(&remote_path, FileStatus::WouldUpload);
                }
                Classification::Upload(reason) => {
                    debug!("Queue {} ({:?})", remote_path, reason);
                    to_upload.push(decision.descriptor);
                }
            }
        }

        info!(
            "{}: {} files scanned, {} to upload",
            date,
            file_count,
            to_upload.len()
        );

        if !to_upload.is_empty() {
            self.upload_all(date, to_upload, options, run, abort).await;
        }

        file_count
    }

    async fn upload_all(
        &self,
        date: &str,
        files: Vec<FileDescriptor>,
        options: &UploadOptions,
        run: &mut RunState,
        abort: &CancellationToken,
    ) {
        let pool = ConcurrencyPool::new(options.concurrency);
        debug!("{}: uploading {} files, {} at a time", date, files.len(), pool.limit());

        let tasks = files.iter().cloned().map(|descriptor| {
            let store = Arc::clone(&self.store);
            let hasher = Arc::clone(&self.hasher);
            let abort = abort.clone();
            let partition = date.to_string();
            move || upload_file(store, hasher, descriptor, partition, abort)
        });

        let outcomes = pool.run(tasks, abort).await;

        let not_started = outcomes.iter().filter(|o| o.is_not_started()).count();
        if not_started > 0 {
            warn!("{}: {} uploads not started after abort", date, not_started);
        }

        for (descriptor, outcome) in files.into_iter().zip(outcomes) {
            match outcome {
                TaskOutcome::Completed(checksum) => {
                    run.counts.uploaded();
                    match checksum {
                        Some(checksum) => {
                            run.manifest.record(
                                descriptor.remote_path.clone(),
                                ManifestEntry {
                                    checksum,
                                    size: descriptor.size,
                                    modified_ms: descriptor.modified_ms,
                                    uploaded_at: self.clock.now_iso(),
                                },
                            );
                            run.manifest_dirty = true;
                        }
                        None => {
                            warn!(
                                "Uploaded {} but no checksum is available, manifest not updated",
                                descriptor.remote_path
                            );
                        }
                    }
                    self.reporter
                        .on_file_uploaded(&descriptor.remote_path, FileStatus::Uploaded);
                }
                TaskOutcome::Failed(e) => {
                    if e.is_auth() {
                        if !run.auth_error {
                            error!("Authentication rejected by {}, aborting run: {}", self.store.name(), e);
                        }
                        run.auth_error = true;
                    } else {
                        warn!("Failed to upload {}: {}", descriptor.remote_path, e);
                    }
                    run.record_failure(&descriptor.remote_path, e.to_string(), self.clock.now_iso());
                    self.reporter
                        .on_file_uploaded(&descriptor.remote_path, FileStatus::Failed);
                }
                TaskOutcome::NotStarted => {
                    run.counts.not_started();
                }
            }
        }
    }
}

/// Upload one file and return the checksum of what was sent, if one could be
/// determined.
///
/// An authentication failure cancels `abort` before returning so the pool
/// stops starting tasks as soon as this slot frees.
async fn upload_file(
    store: Arc<dyn ObjectStore>,
    hasher: Arc<dyn ContentHasher>,
    descriptor: FileDescriptor,
    partition: String,
    abort: CancellationToken,
) -> Result<Option<String>> {
    let result = put_file(store.as_ref(), hasher.as_ref(), &descriptor, &partition).await;
    if let Err(e) = &result {
        if e.is_auth() {
            abort.cancel();
        }
    }
    result
}

async fn put_file(
    store: &dyn ObjectStore,
    hasher: &dyn ContentHasher,
    descriptor: &FileDescriptor,
    partition: &str,
) -> Result<Option<String>> {
    let file = tokio::fs::File::open(&descriptor.local_path).await?;
    let (body, digest) = DigestStream::new(ReaderStream::new(file), hasher.digester());

    let mut metadata = BTreeMap::new();
    metadata.insert("mtime-ms".to_string(), descriptor.modified_ms.to_string());
    metadata.insert("size".to_string(), descriptor.size.to_string());
    metadata.insert("partition".to_string(), partition.to_string());

    store
        .put(PutRequest {
            remote_path: descriptor.remote_path.clone(),
            body: Box::pin(body),
            content_length: descriptor.size,
            content_type: content_type_for(&descriptor.local_path).to_string(),
            metadata,
        })
        .await?;

    // The transport may stop reading at content-length without draining the stream
    if let Some(streamed) = digest.get() {
        if streamed.bytes != descriptor.size {
            warn!(
                "{} changed during upload: sent {} bytes, scanned {}",
                descriptor.remote_path, streamed.bytes, descriptor.size
            );
        }
        return Ok(Some(streamed.checksum));
    }
    if let Some(checksum) = &descriptor.checksum {
        return Ok(Some(checksum.clone()));
    }

    // The object is stored either way; only the manifest entry depends on this
    match hasher.hash_file(&descriptor.local_path).await {
        Ok(checksum) => Ok(Some(checksum)),
        Err(e) => {
            warn!("Failed to hash {} after upload: {}", descriptor.remote_path, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::store::DEFAULT_MANIFEST_FILE;
    use crate::store::memory::FailMode;
    use crate::store::MemoryStore;
    use crate::sync::options::DateScope;
    use crate::sync::progress::ProgressEvent;
    use crate::testing::{CountingHasher, FixedClock, RecordingReporter, UndrainedStore};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Harness {
        root: TempDir,
        store: Arc<MemoryStore>,
        hasher: Arc<CountingHasher>,
        reporter: Arc<RecordingReporter>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                store: Arc::new(MemoryStore::new()),
                hasher: Arc::new(CountingHasher::blake3()),
                reporter: Arc::new(RecordingReporter::default()),
            }
        }

        fn write(&self, relative: &str, data: &[u8]) {
            let path = self.root.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, data).unwrap();
        }

        fn engine(&self) -> SyncEngine {
            SyncEngine::new(self.store.clone())
                .with_hasher(self.hasher.clone())
                .with_clock(Arc::new(FixedClock::new("2024-06-01T00:00:00.000Z")))
                .with_reporter(self.reporter.clone())
        }

        /// Same clock and reporter, different store and hasher.
        fn engine_with(&self, store: Arc<dyn ObjectStore>, hasher: Arc<dyn ContentHasher>) -> SyncEngine {
            SyncEngine::new(store)
                .with_hasher(hasher)
                .with_clock(Arc::new(FixedClock::new("2024-06-01T00:00:00.000Z")))
                .with_reporter(self.reporter.clone())
        }

        fn options(&self) -> UploadOptions {
            UploadOptions::new(self.root.path())
        }

        fn manifest_path(&self) -> std::path::PathBuf {
            self.root.path().join(DEFAULT_MANIFEST_FILE)
        }

        async fn manifest(&self) -> Manifest {
            ManifestStore::new(self.manifest_path()).load().await
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[tokio::test]
    async fn test_first_run_uploads_and_records_manifest() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"a,b\n1,2\n");
        h.write("2024-01-01/nested/b.json", b"{}");
        h.write("2024-01-02/c.csv", b"c\n");

        let summary = h.engine().run(&h.options()).await.unwrap();

        assert_eq!(summary.files_processed(), 3);
        assert_eq!(summary.files_uploaded(), 3);
        assert!(summary.counts.is_consistent());
        assert!(summary.is_clean());
        assert_eq!(summary.dates_processed, vec!["2024-01-01", "2024-01-02"]);

        let object = h.store.get("cache/2024-01-01/a.csv").unwrap();
        assert_eq!(&object.data[..], b"a,b\n1,2\n");
        assert_eq!(object.content_type, "text/csv");
        assert_eq!(object.metadata.get("partition").map(String::as_str), Some("2024-01-01"));
        assert_eq!(object.metadata.get("size").map(String::as_str), Some("8"));

        let manifest = h.manifest().await;
        assert_eq!(manifest.len(), 3);
        let entry = manifest.get("cache/2024-01-01/a.csv").unwrap();
        assert_eq!(entry.checksum, blake3::hash(b"a,b\n1,2\n").to_hex().to_string());
        assert_eq!(entry.size, 8);
        assert_eq!(entry.uploaded_at, "2024-06-01T00:00:00.000Z");

        // New files are digested in transit, never hashed separately
        assert_eq!(h.hasher.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_run_skips_unchanged_files() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");
        h.write("2024-01-01/b.csv", b"2");

        h.engine().run(&h.options()).await.unwrap();
        let puts = h.store.put_calls();
        let manifest_before = fs::read(h.manifest_path()).unwrap();

        let summary = h.engine().run(&h.options()).await.unwrap();

        assert_eq!(summary.files_skipped(), 2);
        assert_eq!(summary.files_uploaded(), 0);
        assert_eq!(h.store.put_calls(), puts);
        assert_eq!(h.hasher.calls(), 0);
        // Nothing changed, nothing rewritten
        assert_eq!(fs::read(h.manifest_path()).unwrap(), manifest_before);
    }

    #[tokio::test]
    async fn test_mtime_drift_with_same_content_is_skipped() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"same");
        h.engine().run(&h.options()).await.unwrap();
        let recorded = h.manifest().await.get("cache/2024-01-01/a.csv").cloned().unwrap();

        set_mtime(
            &h.root.path().join("2024-01-01/a.csv"),
            SystemTime::now() + Duration::from_secs(3600),
        );

        let summary = h.engine().run(&h.options()).await.unwrap();

        assert_eq!(summary.files_skipped(), 1);
        assert_eq!(h.hasher.calls(), 1);
        assert_eq!(h.store.put_calls(), 1);
        // A skip leaves the entry as it was
        assert_eq!(h.manifest().await.get("cache/2024-01-01/a.csv"), Some(&recorded));
    }

    #[tokio::test]
    async fn test_changed_content_is_uploaded_again() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"old");
        h.engine().run(&h.options()).await.unwrap();

        h.write("2024-01-01/a.csv", b"new content");
        let summary = h.engine().run(&h.options()).await.unwrap();

        assert_eq!(summary.files_uploaded(), 1);
        assert_eq!(h.store.put_calls(), 2);
        assert_eq!(&h.store.get("cache/2024-01-01/a.csv").unwrap().data[..], b"new content");

        let entry = h.manifest().await.get("cache/2024-01-01/a.csv").cloned().unwrap();
        assert_eq!(entry.checksum, blake3::hash(b"new content").to_hex().to_string());
        assert_eq!(entry.size, 11);
    }

    #[tokio::test]
    async fn test_full_mode_uploads_everything() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");
        h.engine().run(&h.options()).await.unwrap();

        let options = UploadOptions {
            incremental: false,
            ..h.options()
        };
        let summary = h.engine().run(&options).await.unwrap();

        assert_eq!(summary.files_uploaded(), 1);
        assert_eq!(h.store.put_calls(), 2);
        assert_eq!(h.hasher.calls(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");
        h.write("2024-01-01/b.csv", b"2");
        h.write("2024-01-02/c.csv", b"3");

        let options = UploadOptions {
            dry_run: true,
            ..h.options()
        };
        let summary = h.engine().run(&options).await.unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.files_processed(), 3);
        assert_eq!(summary.files_skipped(), 3);
        assert_eq!(summary.files_uploaded(), 0);
        assert_eq!(h.store.put_calls(), 0);
        assert_eq!(h.hasher.calls(), 0);
        assert_eq!(h.hasher.digesters(), 0);
        assert!(!h.manifest_path().exists());

        let would_upload = h
            .reporter
            .events()
            .into_iter()
            .filter(|e| matches!(e, ProgressEvent::FileUploaded { status: FileStatus::WouldUpload, .. }))
            .count();
        assert_eq!(would_upload, 3);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_run() {
        let h = Harness::new();
        for i in 1..=5 {
            h.write(&format!("2024-01-01/f{}.csv", i), b"row");
        }
        h.write("2024-01-02/later.csv", b"row");

        h.store.delay_path("cache/2024-01-01/f1.csv", Duration::from_millis(50));
        h.store.fail_path("cache/2024-01-01/f2.csv", FailMode::Unauthorized);

        let options = UploadOptions {
            concurrency: 2,
            ..h.options()
        };
        let summary = h.engine().run(&options).await.unwrap();

        assert!(summary.auth_error);
        assert!(!summary.cancelled);
        assert_eq!(summary.files_uploaded(), 1);
        assert_eq!(summary.files_failed(), 1);
        assert_eq!(summary.files_skipped(), 0);
        assert_eq!(summary.files_processed(), 2);
        assert_eq!(summary.counts.files_not_started, 3);
        assert!(summary.counts.is_consistent());
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].file, "cache/2024-01-01/f2.csv");

        // No new starts after the abort, and no further dates
        assert_eq!(h.store.put_calls(), 2);
        assert_eq!(summary.dates_processed, vec!["2024-01-01"]);
        assert!(h.store.get("cache/2024-01-02/later.csv").is_none());

        // The finished upload was still flushed
        let manifest = h.manifest().await;
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("cache/2024-01-01/f1.csv").is_some());
    }

    #[tokio::test]
    async fn test_server_error_is_recorded_and_run_continues() {
        let h = Harness::new();
        h.write("2024-01-01/bad.csv", b"x");
        h.write("2024-01-01/good.csv", b"y");
        h.write("2024-01-02/next.csv", b"z");
        h.store.fail_path("cache/2024-01-01/bad.csv", FailMode::ServerError);

        let summary = h.engine().run(&h.options()).await.unwrap();

        assert!(!summary.auth_error);
        assert_eq!(summary.files_uploaded(), 2);
        assert_eq!(summary.files_failed(), 1);
        assert_eq!(summary.errors[0].file, "cache/2024-01-01/bad.csv");
        assert_eq!(summary.errors[0].timestamp, "2024-06-01T00:00:00.000Z");

        let manifest = h.manifest().await;
        assert!(manifest.get("cache/2024-01-01/bad.csv").is_none());
        assert!(manifest.get("cache/2024-01-02/next.csv").is_some());
    }

    #[tokio::test]
    async fn test_date_scope_limits_work() {
        let h = Harness::new();
        for date in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"] {
            h.write(&format!("{}/a.csv", date), b"1");
        }

        let options = UploadOptions {
            scope: DateScope::Range {
                since: Some("2024-01-02".into()),
                until: Some("2024-01-03".into()),
            },
            ..h.options()
        };
        let summary = h.engine().run(&options).await.unwrap();

        assert_eq!(summary.dates_processed, vec!["2024-01-02", "2024-01-03"]);
        assert_eq!(h.store.object_count(), 2);

        let dates: Vec<(usize, usize, String)> = h
            .reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::DateComplete { index, total, date, .. } => Some((index, total, date)),
                _ => None,
            })
            .collect();
        assert_eq!(
            dates,
            vec![
                (1, 2, "2024-01-02".to_string()),
                (2, 2, "2024-01-03".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_no_dates_in_scope_is_an_error() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");

        let options = UploadOptions {
            scope: DateScope::Single("2030-01-01".into()),
            ..h.options()
        };
        let result = h.engine().run(&options).await;

        assert!(matches!(result, Err(SyncError::NoDatesFound { .. })));
        assert_eq!(h.store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_cache_root_is_an_error() {
        let h = Harness::new();
        let options = UploadOptions::new(h.root.path().join("absent"));

        let result = h.engine().run(&options).await;
        assert!(matches!(result, Err(SyncError::Io(_))));
    }

    #[tokio::test]
    async fn test_manifest_write_failure_is_flagged() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");

        let options = UploadOptions {
            manifest_file: "no-such-dir/manifest.json".to_string(),
            ..h.options()
        };
        let summary = h.engine().run(&options).await.unwrap();

        assert!(summary.manifest_write_error);
        assert_eq!(summary.files_uploaded(), 1);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_operator_cancel_starts_nothing() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = h
            .engine()
            .with_cancel(cancel)
            .run(&h.options())
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert!(!summary.auth_error);
        assert!(summary.dates_processed.is_empty());
        assert_eq!(summary.files_processed(), 0);
        assert_eq!(h.store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_ends_with_complete() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"1");

        h.engine().run(&h.options()).await.unwrap();

        let events = h.reporter.events();
        assert!(matches!(
            events.first(),
            Some(ProgressEvent::FileUploaded { status: FileStatus::Uploaded, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Complete { counts }) if counts.files_uploaded == 1
        ));
    }

    #[tokio::test]
    async fn test_scope_without_files_is_an_error() {
        let h = Harness::new();
        fs::create_dir_all(h.root.path().join("2024-01-01")).unwrap();
        fs::create_dir_all(h.root.path().join("2024-01-02/empty")).unwrap();

        let result = h.engine().run(&h.options()).await;

        assert!(matches!(result, Err(SyncError::NoFilesFound { .. })));
        assert_eq!(h.store.put_calls(), 0);
        assert!(!h.manifest_path().exists());
    }

    #[tokio::test]
    async fn test_one_empty_date_among_others_is_fine() {
        let h = Harness::new();
        fs::create_dir_all(h.root.path().join("2024-01-01")).unwrap();
        h.write("2024-01-02/a.csv", b"1");

        let summary = h.engine().run(&h.options()).await.unwrap();
        assert_eq!(summary.dates_processed, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(summary.files_uploaded(), 1);
    }

    #[tokio::test]
    async fn test_hash_failure_is_recorded_and_scan_continues() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"first");
        h.write("2024-01-01/b.csv", b"second");
        h.engine().run(&h.options()).await.unwrap();
        let recorded = h.manifest().await.get("cache/2024-01-01/a.csv").cloned().unwrap();

        set_mtime(
            &h.root.path().join("2024-01-01/a.csv"),
            SystemTime::now() + Duration::from_secs(3600),
        );

        let failing = Arc::new(CountingHasher::failing("boom"));
        let summary = h
            .engine()
            .with_hasher(failing.clone())
            .run(&h.options())
            .await
            .unwrap();

        assert_eq!(summary.files_processed(), 2);
        assert_eq!(summary.files_failed(), 1);
        assert_eq!(summary.files_skipped(), 1);
        assert!(summary.counts.is_consistent());
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].file, "cache/2024-01-01/a.csv");
        assert_eq!(summary.errors[0].error, "hash failed: boom");
        assert_eq!(failing.calls(), 1);
        assert_eq!(h.store.put_calls(), 2);
        assert_eq!(h.manifest().await.get("cache/2024-01-01/a.csv"), Some(&recorded));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_unreadable_directory_does_not_stop_scan() {
        use std::os::unix::fs::PermissionsExt;

        let h = Harness::new();
        h.write("2024-01-01/a_locked/inner.csv", b"hidden");
        h.write("2024-01-01/b.csv", b"visible");
        let locked = h.root.path().join("2024-01-01/a_locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not apply to root
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let summary = h.engine().run(&h.options()).await.unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(summary.files_processed(), 2);
        assert_eq!(summary.files_failed(), 1);
        assert_eq!(summary.files_uploaded(), 1);
        assert!(summary.counts.is_consistent());
        assert!(summary.errors[0].file.ends_with("a_locked"));
        assert!(h.store.get("cache/2024-01-01/b.csv").is_some());
        assert!(h.store.get("cache/2024-01-01/a_locked/inner.csv").is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_scan_stops_classifying() {
        let h = Harness::new();
        for name in ["a", "b", "c"] {
            h.write(&format!("2024-01-01/{}.csv", name), name.as_bytes());
        }
        h.write("2024-01-02/d.csv", b"d");
        h.engine().run(&h.options()).await.unwrap();

        for name in ["a", "b", "c"] {
            set_mtime(
                &h.root.path().join(format!("2024-01-01/{}.csv", name)),
                SystemTime::now() + Duration::from_secs(3600),
            );
        }

        // The first hash triggers the cancel
        let cancel = CancellationToken::new();
        let hasher = Arc::new(CountingHasher::blake3().cancelling(cancel.clone()));
        let summary = h
            .engine()
            .with_hasher(hasher.clone())
            .with_cancel(cancel)
            .run(&h.options())
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(hasher.calls(), 1);
        assert_eq!(summary.files_processed(), 1);
        assert_eq!(summary.files_skipped(), 1);
        assert!(summary.counts.is_consistent());
        assert_eq!(summary.dates_processed, vec!["2024-01-01"]);
        assert_eq!(h.store.put_calls(), 4);
    }

    #[tokio::test]
    async fn test_undrained_body_falls_back_to_hashing() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"payload");

        let store = Arc::new(UndrainedStore::default());
        let hasher = Arc::new(CountingHasher::blake3());
        let summary = h
            .engine_with(store.clone(), hasher.clone())
            .run(&h.options())
            .await
            .unwrap();

        assert_eq!(summary.files_uploaded(), 1);
        assert_eq!(store.accepted(), 1);
        assert_eq!(hasher.calls(), 1);
        let entry = h.manifest().await.get("cache/2024-01-01/a.csv").cloned().unwrap();
        assert_eq!(entry.checksum, blake3::hash(b"payload").to_hex().to_string());
    }

    #[tokio::test]
    async fn test_accepted_upload_survives_failed_fallback_hash() {
        let h = Harness::new();
        h.write("2024-01-01/a.csv", b"payload");

        let store = Arc::new(UndrainedStore::default());
        let summary = h
            .engine_with(store.clone(), Arc::new(CountingHasher::failing("disk gone")))
            .run(&h.options())
            .await
            .unwrap();

        assert_eq!(summary.files_uploaded(), 1);
        assert_eq!(summary.files_failed(), 0);
        assert!(summary.errors.is_empty());
        assert!(summary.is_clean());
        // Without a checksum there is nothing to record
        assert!(h.manifest().await.get("cache/2024-01-01/a.csv").is_none());

        let uploaded = h
            .reporter
            .events()
            .into_iter()
            .filter(|e| matches!(e, ProgressEvent::FileUploaded { status: FileStatus::Uploaded, .. }))
            .count();
        assert_eq!(uploaded, 1);
    }

    #[test]
    fn test_system_clock_format() {
        let now = SystemClock.now_iso();
        assert!(now.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
