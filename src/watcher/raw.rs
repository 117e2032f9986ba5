//! Raw capture directory loop
//!
//! Registers every new capture file, waits for it to stop growing and runs it
//! through the transformer.

use super::filtering::SuffixFilter;
use super::stability::SizeStabilityDetector;
use super::types::{DirectorySnapshot, StabilityEvent};
use super::{poll_directory, sleep_or_cancel};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::transform::RecordTransformer;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one poll cycle of the raw watcher did
#[derive(Debug, Default)]
pub struct RawCycleReport {
    pub detected: Vec<String>,
    pub cleaned: Vec<PathBuf>,
    pub failed: Vec<String>,
    pub vanished: Vec<String>,
}

pub struct RawDataWatcher {
    directory: PathBuf,
    filter: SuffixFilter,
    poll_interval: Duration,
    already_seen: DirectorySnapshot,
    detector: SizeStabilityDetector,
    transformer: RecordTransformer,
}

impl RawDataWatcher {
    /// Files already in the raw directory at construction time are never processed
    pub async fn new(config: &PipelineConfig, transformer: RecordTransformer) -> PipelineResult<Self> {
        let directory = config.paths.raw_dir.clone();
        let already_seen = poll_directory(&directory).await?;
        debug!(
            "Raw watcher seeded with {} existing entries in {}",
            already_seen.len(),
            directory.display()
        );

        Ok(Self {
            directory,
            filter: SuffixFilter::new(config.watch.raw_suffix.clone()),
            poll_interval: config.watch.raw_poll_interval(),
            already_seen,
            detector: SizeStabilityDetector::new(config.watch.settle_delay()),
            transformer,
        })
    }

    pub fn tracked_count(&self) -> usize {
        self.detector.tracked_count()
    }

    /// One poll: register new captures, re-check tracked ones, transform the stable ones
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> PipelineResult<RawCycleReport> {
        let current = poll_directory(&self.directory).await?;
        let mut report = RawCycleReport::default();

        for name in current.newly_appeared(&self.already_seen) {
            if !self.filter.matches(&name) {
                continue;
            }
            let path = self.directory.join(&name);
            match tokio::fs::metadata(&path).await {
                Ok(metadata) => {
                    info!("New capture file detected: {}", path.display());
                    self.detector.track(&name, metadata.len());
                    report.detected.push(name);
                }
                Err(e) => warn!("Could not stat new file {}: {}", path.display(), e),
            }
        }

        for event in self.detector.check(&self.directory, &current, cancel).await {
            match event {
                StabilityEvent::Stable { name, path, size } => {
                    debug!("{} finished writing at {} bytes", name, size);
                    match self.transformer.transform(&path).await {
                        Ok(outcome) => report.cleaned.push(outcome.cleaned_path),
                        Err(e) => {
                            error!("Failed to convert capture file {}: {}", path.display(), e);
                            report.failed.push(name);
                        }
                    }
                }
                StabilityEvent::Vanished { name } => report.vanished.push(name),
                StabilityEvent::Growing { .. } => {}
            }
        }

        self.already_seen = current;
        Ok(report)
    }

    /// Poll until `cancel` fires. Unreadable directories are logged and retried next cycle.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Monitoring raw capture directory: {}", self.directory.display());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.poll_once(&cancel).await {
                warn!("Raw watcher poll failed, retrying next cycle: {}", e);
            }

            if sleep_or_cancel(self.poll_interval, &cancel).await {
                break;
            }
        }

        info!("Raw capture watcher stopped");
    }
}
