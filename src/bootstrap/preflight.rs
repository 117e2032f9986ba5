//! Installation and path checks run before anything is started

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightCheck {
    /// `<program> --version` must exit successfully
    Installed { name: String, program: String },
    /// Directory must already exist
    PathExists { name: String, path: PathBuf },
}

impl PreflightCheck {
    pub fn name(&self) -> &str {
        match self {
            PreflightCheck::Installed { name, .. } | PreflightCheck::PathExists { name, .. } => name,
        }
    }
}

/// Services first, then the decoder, then the two data directories
pub fn plan(config: &PipelineConfig) -> Vec<PreflightCheck> {
    let mut checks: Vec<PreflightCheck> = config
        .services
        .iter()
        .map(|service| PreflightCheck::Installed {
            name: service.name.clone(),
            program: service.program.clone(),
        })
        .collect();

    checks.push(PreflightCheck::Installed {
        name: "decoder".to_string(),
        program: config.decoder.program.clone(),
    });
    checks.push(PreflightCheck::PathExists {
        name: "raw data".to_string(),
        path: config.paths.raw_dir.clone(),
    });
    checks.push(PreflightCheck::PathExists {
        name: "cleaned data".to_string(),
        path: config.paths.cleaned_dir.clone(),
    });
    checks
}

pub async fn run_check(check: &PreflightCheck) -> PipelineResult<String> {
    match check {
        PreflightCheck::Installed { name, program } => {
            debug!("Checking {} with {} --version", name, program);
            let output = tokio::time::timeout(
                VERSION_CHECK_TIMEOUT,
                Command::new(program)
                    .arg("--version")
                    .stdin(Stdio::null())
                    .output(),
            )
            .await
            .map_err(|_| failed(name, format!("{} --version timed out", program)))?
            .map_err(|e| failed(name, format!("cannot run {}: {}", program, e)))?;

            if !output.status.success() {
                return Err(failed(
                    name,
                    format!("{} --version exited with {}", program, output.status),
                ));
            }
            Ok(format!("{} is installed and accessible", name))
        }
        PreflightCheck::PathExists { name, path } => {
            if path.is_dir() {
                Ok(format!("Path to {} confirmed: {}", name, path.display()))
            } else {
                Err(failed(name, format!("{} does not exist", path.display())))
            }
        }
    }
}

/// Run every check in order and stop at the first failure
pub async fn run_preflight(config: &PipelineConfig) -> PipelineResult<Vec<String>> {
    info!("Checking installations and paths");
    let mut confirmations = Vec::new();
    for check in plan(config) {
        let message = run_check(&check).await?;
        info!("{}", message);
        confirmations.push(message);
    }
    Ok(confirmations)
}

fn failed(check: &str, reason: String) -> PipelineError {
    PipelineError::PreflightFailed {
        check: check.to_string(),
        reason,
    }
}
