use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the watch / transform / dispatch pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Directory could not be listed at poll time. Transient: the loop retries next cycle.
    #[error("Directory unavailable: {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode failed for {path}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    #[error("Dispatch failed for {path}: {reason}")]
    DispatchFailed { path: PathBuf, reason: String },

    #[error("Dependency {service} unavailable: {reason}")]
    DependencyUnavailable { service: String, reason: String },

    #[error("Pre-flight check '{check}' failed: {reason}")]
    PreflightFailed { check: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Shorthand used by the directory listing helpers
    pub fn directory_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::DirectoryUnavailable {
            path: path.into(),
            source,
        }
    }
}
