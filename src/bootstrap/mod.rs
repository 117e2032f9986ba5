//! Dependent Service Bootstrap
//!
//! Brings up the search server, the dashboard and the log pipeline one after
//! another, waiting for each health endpoint before starting the next, then
//! starts the continuous capture that feeds the raw directory.

pub mod health;
pub mod launcher;
pub mod preflight;

use crate::config::{CaptureConfig, PipelineConfig};
use crate::error::PipelineResult;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use health::{HealthProbe, Readiness};
pub use launcher::{ProcessHandle, ServiceLauncher, spawn_process};
pub use preflight::{PreflightCheck, run_preflight};

/// Arguments for the ring-buffer capture writing into `raw_dir`
pub fn capture_args(capture: &CaptureConfig, raw_dir: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        capture.interface.clone(),
        "-b".to_string(),
        format!("packets:{}", capture.packets_per_file),
        "-w".to_string(),
        raw_dir.join(&capture.file_name).to_string_lossy().into_owned(),
    ]
}

pub struct BootstrapSequencer {
    launchers: Vec<ServiceLauncher>,
    capture: CaptureConfig,
    raw_dir: PathBuf,
    log_dir: Option<PathBuf>,
    handles: Vec<ProcessHandle>,
}

impl BootstrapSequencer {
    pub fn new(config: &PipelineConfig, log_dir: Option<PathBuf>) -> PipelineResult<Self> {
        let launchers = config
            .services
            .iter()
            .cloned()
            .map(|service| ServiceLauncher::new(service, log_dir.clone()))
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            launchers,
            capture: config.capture.clone(),
            raw_dir: config.paths.raw_dir.clone(),
            log_dir,
            handles: Vec::new(),
        })
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    /// Start each service in order and wait for it, then start the capture
    pub async fn run(&mut self, cancel: &CancellationToken) -> PipelineResult<()> {
        for launcher in &self.launchers {
            let handle = launcher.start()?;
            self.handles.push(handle);
            launcher.wait_until_ready(cancel).await?;
        }

        if self.capture.enabled {
            info!("Beginning packet capture on interface {}", self.capture.interface);
            let handle = spawn_process(
                "capture",
                &self.capture.program,
                &capture_args(&self.capture, &self.raw_dir),
                None,
                self.log_dir.as_deref(),
            )?;
            self.handles.push(handle);
        }

        Ok(())
    }

    /// Kill everything started by `run`, capture first
    pub async fn shutdown(&mut self) {
        while let Some(mut handle) = self.handles.pop() {
            handle.shutdown().await;
        }
    }
}
