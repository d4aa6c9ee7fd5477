//! Upload pipeline: classification, bounded execution, reporting and the
//! orchestrator that ties them together per date.

pub mod classify;
pub mod engine;
pub mod options;
pub mod pool;
pub mod progress;
pub mod summary;

pub use classify::{Classification, FastPathClassifier};
pub use engine::{Clock, SyncEngine, SystemClock};
pub use options::{DateScope, UploadOptions};
pub use pool::{ConcurrencyPool, TaskOutcome};
pub use progress::{ChannelReporter, FileStatus, LogReporter, NoopReporter, ProgressEvent, ProgressReporter};
pub use summary::{FileError, SummaryCounts, UploadSummary};
