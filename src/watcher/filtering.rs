//! File filtering logic for watcher operations
//!
//! Decides which directory entries each watcher cares about, based on the
//! configured name suffix.

/// Matches directory entries by name suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixFilter {
    suffix: String,
}

impl SuffixFilter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Hidden files never match, so editors' swap files and our own temp output are skipped
    pub fn matches(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }
        name.len() > self.suffix.len() && name.ends_with(&self.suffix)
    }
}
