//! Sequential naming for cleaned record files
//!
//! Numbering resumes from the highest `cleaned_packets_NNNN.json` already in
//! the output directory, so a restart never reuses a name.

use crate::error::{PipelineError, PipelineResult};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

pub const CLEANED_PREFIX: &str = "cleaned_packets_";
pub const CLEANED_EXTENSION: &str = "json";

static CLEANED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^cleaned_packets_(\d+)\.json$").expect("cleaned file name pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u32,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceCounter {
    pub fn starting_at(next: u32) -> Self {
        Self { next: next.max(1) }
    }

    /// Resume after the highest counter found in `directory` (1 when there is none)
    pub fn from_directory(directory: &Path) -> PipelineResult<Self> {
        let entries = std::fs::read_dir(directory)
            .map_err(|e| PipelineError::directory_unavailable(directory, e))?;

        let highest = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| parse_counter(&name))
            .max()
            .unwrap_or(0);

        debug!(
            "Cleaned file numbering in {} resumes at {}",
            directory.display(),
            highest + 1
        );
        Ok(Self::starting_at(highest.saturating_add(1)))
    }

    pub fn peek(&self) -> u32 {
        self.next
    }

    pub fn current_file_name(&self) -> String {
        file_name_for(self.next)
    }

    pub fn advance(&mut self) {
        self.next = self.next.saturating_add(1);
    }
}

/// `cleaned_packets_0007.json`
pub fn file_name_for(counter: u32) -> String {
    format!("{CLEANED_PREFIX}{counter:04}.{CLEANED_EXTENSION}")
}

pub fn parse_counter(name: &str) -> Option<u32> {
    CLEANED_NAME
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
