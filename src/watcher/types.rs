//! Type definitions for directory polling and stability tracking
//!
//! This module defines the snapshot taken on every poll cycle, the per-file
//! tracking record and the events the stability detector reports.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;

/// File names present in a directory at one poll instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    names: HashSet<String>,
}

impl DirectorySnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names present in `self` but not in `previous`, sorted for stable processing order
    pub fn newly_appeared(&self, previous: &DirectorySnapshot) -> Vec<String> {
        let mut fresh: Vec<String> = self.names.difference(&previous.names).cloned().collect();
        fresh.sort();
        fresh
    }
}

impl FromIterator<String> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// A file being watched until its size stops changing
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub name: String,
    pub last_size: u64,
    pub first_seen: DateTime<Utc>,
}

impl WatchedFile {
    pub fn new(name: String, size: u64) -> Self {
        Self {
            name,
            last_size: size,
            first_seen: Utc::now(),
        }
    }
}

/// Outcome of re-checking one tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityEvent {
    /// Size grew since the last observation, still tracked
    Growing { name: String, size: u64 },
    /// Size unchanged across one settle interval, safe to process
    Stable { name: String, path: PathBuf, size: u64 },
    /// Disappeared before it became stable, dropped from tracking
    Vanished { name: String },
}
