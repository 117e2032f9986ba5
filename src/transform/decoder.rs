//! Capture decoding via the external dissector

use crate::config::DecoderConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Turns a raw capture file into line-delimited bulk records at `output`
#[async_trait]
pub trait CaptureDecoder: Send + Sync {
    async fn decode(&self, input: &Path, output: &Path) -> PipelineResult<()>;
}

/// Runs `<program> -r <input> -T <format>` with stdout redirected into the output file
#[derive(Debug, Clone)]
pub struct TsharkDecoder {
    program: String,
    format: String,
}

impl TsharkDecoder {
    pub fn new(program: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.program.clone(), config.format.clone())
    }
}

#[async_trait]
impl CaptureDecoder for TsharkDecoder {
    async fn decode(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        let out_file = std::fs::File::create(output).map_err(|e| PipelineError::DecodeFailed {
            path: input.to_path_buf(),
            reason: format!("cannot create {}: {}", output.display(), e),
        })?;

        debug!(
            "Running {} -r {} -T {}",
            self.program,
            input.display(),
            self.format
        );

        // `output()` would replace the stdout redirect with a pipe, so spawn and wait instead
        let child = Command::new(&self.program)
            .arg("-r")
            .arg(input)
            .arg("-T")
            .arg(&self.format)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::DecodeFailed {
                path: input.to_path_buf(),
                reason: format!("failed to launch {}: {}", self.program, e),
            })?;

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| PipelineError::DecodeFailed {
                path: input.to_path_buf(),
                reason: format!("{} did not finish: {}", self.program, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::DecodeFailed {
                path: input.to_path_buf(),
                reason: format!("{} exited with {}: {}", self.program, result.status, stderr.trim()),
            });
        }

        Ok(())
    }
}
