//! Service process launching and readiness waits

use super::health::{HealthProbe, Readiness};
use crate::config::ServiceConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::watcher::sleep_or_cancel;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A spawned background process, killed when dropped
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Child,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub async fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }
        match self.child.kill().await {
            Ok(()) => info!("Stopped {}", self.name),
            Err(e) => warn!("Failed to stop {}: {}", self.name, e),
        }
    }
}

/// Spawn `program args..` with output appended to `<log_dir>/<name>.log` when a log dir is given
pub fn spawn_process(
    name: &str,
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
    log_dir: Option<&Path>,
) -> PipelineResult<ProcessHandle> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).kill_on_drop(true);

    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    match log_dir {
        Some(dir) => {
            let log_path = dir.join(format!("{}.log", name));
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;
            let err_file = log_file.try_clone()?;
            command.stdout(Stdio::from(log_file)).stderr(Stdio::from(err_file));
            debug!("{} output goes to {}", name, log_path.display());
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    let child = command.spawn().map_err(|e| PipelineError::DependencyUnavailable {
        service: name.to_string(),
        reason: format!("failed to launch {}: {}", program, e),
    })?;

    Ok(ProcessHandle {
        name: name.to_string(),
        child,
    })
}

/// Starts one dependent service and waits for its health endpoint
pub struct ServiceLauncher {
    config: ServiceConfig,
    probe: HealthProbe,
    log_dir: Option<PathBuf>,
}

impl ServiceLauncher {
    pub fn new(config: ServiceConfig, log_dir: Option<PathBuf>) -> PipelineResult<Self> {
        let probe = HealthProbe::for_service(&config)?;
        Ok(Self {
            config,
            probe,
            log_dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn start(&self) -> PipelineResult<ProcessHandle> {
        info!("Starting {}...", self.config.name);
        spawn_process(
            &self.config.name,
            &self.config.program,
            &self.config.args,
            self.config.working_dir.as_deref(),
            self.log_dir.as_deref(),
        )
    }

    pub async fn health_check(&self) -> Readiness {
        self.probe.check().await
    }

    /// Probe on the service's interval until it is ready.
    ///
    /// Without `max_wait` this blocks until ready or cancelled.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> PipelineResult<u16> {
        let interval = self.config.poll_interval();
        let deadline = self.config.max_wait().map(|wait| Instant::now() + wait);

        loop {
            let readiness = self.health_check().await;
            if let Readiness::Ready(status) = readiness {
                info!("{} successfully started ({})", self.config.name, status);
                return Ok(status);
            }
            info!("{} is {}. Waiting...", self.config.name, readiness.describe());

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.unavailable(format!(
                            "not ready after {:?}: {}",
                            self.config.max_wait().unwrap_or_default(),
                            readiness.describe()
                        )));
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };

            if sleep_or_cancel(sleep_for, cancel).await {
                return Err(self.unavailable("startup cancelled".to_string()));
            }
        }
    }

    fn unavailable(&self, reason: String) -> PipelineError {
        PipelineError::DependencyUnavailable {
            service: self.config.name.clone(),
            reason,
        }
    }
}
