//! Size-based completion detection
//!
//! A capture file is considered finished once its size is unchanged across
//! one settle interval. Each check sleeps the settle delay per tracked file,
//! then compares the fresh size with the last recorded one.

use super::sleep_or_cancel;
use super::types::{DirectorySnapshot, StabilityEvent, WatchedFile};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SizeStabilityDetector {
    settle_delay: Duration,
    tracked: HashMap<String, WatchedFile>,
}

impl SizeStabilityDetector {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            tracked: HashMap::new(),
        }
    }

    /// Start tracking `name` with its first observed size. Already tracked names are left alone.
    pub fn track(&mut self, name: &str, size: u64) {
        self.tracked
            .entry(name.to_string())
            .or_insert_with(|| WatchedFile::new(name.to_string(), size));
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.contains_key(name)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn recorded_size(&self, name: &str) -> Option<u64> {
        self.tracked.get(name).map(|f| f.last_size)
    }

    /// Re-check every tracked file against the current snapshot of `directory`.
    ///
    /// Files missing from `snapshot` are dropped with a `Vanished` event. For the
    /// rest, waits the settle delay and re-reads the size: growth keeps the file
    /// tracked, anything else (equal or shrunk) reports it `Stable` and stops
    /// tracking it. If `cancel` fires mid-check the remaining files stay tracked.
    pub async fn check(
        &mut self,
        directory: &Path,
        snapshot: &DirectorySnapshot,
        cancel: &CancellationToken,
    ) -> Vec<StabilityEvent> {
        let mut names: Vec<String> = self.tracked.keys().cloned().collect();
        names.sort();

        let mut events = Vec::with_capacity(names.len());
        for name in names {
            if !snapshot.contains(&name) {
                self.tracked.remove(&name);
                warn!("Tracked file {} vanished before it stopped growing", name);
                events.push(StabilityEvent::Vanished { name });
                continue;
            }

            if sleep_or_cancel(self.settle_delay, cancel).await {
                debug!("Stability check interrupted by shutdown");
                break;
            }

            let path = directory.join(&name);
            let current_size = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    self.tracked.remove(&name);
                    warn!("Tracked file {} could not be re-read ({}), dropping it", name, e);
                    events.push(StabilityEvent::Vanished { name });
                    continue;
                }
            };

            let Some(watched) = self.tracked.get_mut(&name) else {
                continue;
            };

            if current_size > watched.last_size {
                debug!(
                    "{} still growing: {} -> {} bytes",
                    name, watched.last_size, current_size
                );
                watched.last_size = current_size;
                events.push(StabilityEvent::Growing {
                    name,
                    size: current_size,
                });
            } else {
                debug!(
                    "{} stable at {} bytes (tracked since {})",
                    name, current_size, watched.first_seen
                );
                self.tracked.remove(&name);
                events.push(StabilityEvent::Stable {
                    name,
                    path,
                    size: current_size,
                });
            }
        }

        events
    }
}
