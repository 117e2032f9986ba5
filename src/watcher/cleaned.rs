//! Cleaned record directory loop
//!
//! Every new cleaned file is dispatched once. Failures are logged and the file
//! is left on disk.

use super::filtering::SuffixFilter;
use super::types::DirectorySnapshot;
use super::{poll_directory, sleep_or_cancel};
use crate::config::PipelineConfig;
use crate::dispatch::{BulkSink, DispatchResult};
use crate::error::PipelineResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct CleanedCycleReport {
    pub dispatched: Vec<DispatchResult>,
    pub failed: Vec<String>,
}

pub struct CleanedDataWatcher {
    directory: PathBuf,
    filter: SuffixFilter,
    poll_interval: Duration,
    already_seen: DirectorySnapshot,
    sink: Arc<dyn BulkSink>,
    delete_after_dispatch: bool,
}

impl CleanedDataWatcher {
    /// Seeds `already_seen` from the directory unless `ingest.replay_existing` is set
    pub async fn new(config: &PipelineConfig, sink: Arc<dyn BulkSink>) -> PipelineResult<Self> {
        let directory = config.paths.cleaned_dir.clone();
        let already_seen = if config.ingest.replay_existing {
            info!("Replaying files already present in {}", directory.display());
            DirectorySnapshot::default()
        } else {
            poll_directory(&directory).await?
        };

        Ok(Self {
            directory,
            filter: SuffixFilter::new(config.watch.cleaned_suffix.clone()),
            poll_interval: config.watch.cleaned_poll_interval(),
            already_seen,
            sink,
            delete_after_dispatch: config.ingest.delete_after_dispatch,
        })
    }

    pub async fn poll_once(&mut self) -> PipelineResult<CleanedCycleReport> {
        let current = poll_directory(&self.directory).await?;
        let mut report = CleanedCycleReport::default();

        for name in current.newly_appeared(&self.already_seen) {
            if !self.filter.matches(&name) {
                debug!("Ignoring {} in cleaned directory", name);
                continue;
            }

            let path = self.directory.join(&name);
            info!("{} added to cleaned directory, sending to ingest", name);

            match self.sink.send(&path).await {
                Ok(result) => {
                    if self.delete_after_dispatch {
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            warn!("Failed to remove dispatched file {}: {}", path.display(), e);
                        }
                    }
                    report.dispatched.push(result);
                }
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(name);
                }
            }
        }

        self.already_seen = current;
        Ok(report)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Monitoring cleaned data directory: {}", self.directory.display());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.poll_once().await {
                warn!("Cleaned watcher poll failed, retrying next cycle: {}", e);
            }

            if sleep_or_cancel(self.poll_interval, &cancel).await {
                break;
            }
        }

        info!("Cleaned data watcher stopped");
    }
}
