//! Directory Watchers
//!
//! Two polling loops drive the pipeline:
//! 1. **Raw watcher** → spots new capture files, waits for them to stop growing,
//!    then hands them to the [`RecordTransformer`](crate::transform::RecordTransformer)
//! 2. **Cleaned watcher** → spots new cleaned record files and hands them to a
//!    [`BulkSink`](crate::dispatch::BulkSink)
//!
//! Both loops poll with `read_dir` on a fixed interval instead of using a
//! filesystem event API, own their tracking state exclusively, and stop at the
//! next sleep boundary once their cancellation token fires.

pub mod cleaned;
pub mod filtering;
pub mod raw;
pub mod stability;
pub mod types;

use crate::error::{PipelineError, PipelineResult};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use cleaned::{CleanedCycleReport, CleanedDataWatcher};
pub use filtering::SuffixFilter;
pub use raw::{RawCycleReport, RawDataWatcher};
pub use stability::SizeStabilityDetector;
pub use types::{DirectorySnapshot, StabilityEvent, WatchedFile};

/// List the regular files in `directory`
pub async fn poll_directory(directory: &Path) -> PipelineResult<DirectorySnapshot> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| PipelineError::directory_unavailable(directory, e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::directory_unavailable(directory, e))?
    {
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            // Entry removed between listing and stat
            Err(_) => continue,
        }

        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!("Skipping non UTF-8 file name: {:?}", raw),
        }
    }

    Ok(names.into_iter().collect())
}

/// Names in `current` that were not in `previous`
pub fn diff(previous: &DirectorySnapshot, current: &DirectorySnapshot) -> Vec<String> {
    current.newly_appeared(previous)
}

/// Sleep for `duration` unless `cancel` fires first. Returns `true` when cancelled.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
