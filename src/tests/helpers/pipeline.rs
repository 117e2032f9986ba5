//! Pipeline fixtures: temp directories, fast configs, fake decoder and sink

use crate::config::PipelineConfig;
use crate::dispatch::{BulkSink, DispatchResult};
use crate::error::{PipelineError, PipelineResult};
use crate::transform::CaptureDecoder;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Two bulk pairs as the dissector's `ek` export writes them
pub const EK_SAMPLE: &str = concat!(
    "{\"index\":{\"_index\":\"packets-2024-06-18\",\"_type\":\"doc\"}}\n",
    "{\"timestamp\":\"1718700000000\",\"layers\":{\"frame\":{\"frame_frame_len\":\"60\"}}}\n",
    "{\"index\":{\"_index\":\"packets-2024-06-18\",\"_type\":\"doc\"}}\n",
    "{\"timestamp\":\"1718700000100\",\"layers\":{\"frame\":{\"frame_frame_len\":\"1514\"}}}\n",
);

/// Config rooted in `root` with millisecond intervals and no services
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.raw_dir = root.join("raw");
    config.paths.cleaned_dir = root.join("cleaned");
    config.logging.dir = root.join("logs");
    config.watch.raw_poll_interval_ms = 10;
    config.watch.settle_delay_ms = 10;
    config.watch.cleaned_poll_interval_ms = 10;
    config.ingest.username = "elastic".to_string();
    config.ingest.password = "changeme".to_string();
    config.ingest.request_timeout_ms = 5_000;
    config.services.clear();
    config.capture.enabled = false;

    std::fs::create_dir_all(&config.paths.raw_dir).unwrap();
    std::fs::create_dir_all(&config.paths.cleaned_dir).unwrap();
    config
}

/// Writes canned output, or fails after leaving a partial file behind
#[derive(Clone)]
pub struct FakeDecoder {
    output: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn emitting(output: &str) -> Self {
        Self {
            output: output.to_string(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: String::new(),
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDecoder for FakeDecoder {
    async fn decode(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            tokio::fs::write(output, "{\"index\":").await?;
            return Err(PipelineError::DecodeFailed {
                path: input.to_path_buf(),
                reason: "decoder exited with exit status: 1".to_string(),
            });
        }
        tokio::fs::write(output, &self.output).await?;
        Ok(())
    }
}

/// Records what it was sent; names in `failing` are rejected
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    failing: HashSet<String>,
}

impl RecordingSink {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    pub fn sent_bodies(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().iter().map(|(_, body)| body.clone()).collect()
    }
}

#[async_trait]
impl BulkSink for RecordingSink {
    async fn send(&self, path: &Path) -> PipelineResult<DispatchResult> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.failing.contains(&name) {
            return Err(PipelineError::DispatchFailed {
                path: path.to_path_buf(),
                reason: "endpoint returned 500 Internal Server Error".to_string(),
            });
        }

        let body = tokio::fs::read(path).await?;
        let bytes_sent = body.len();
        self.sent.lock().unwrap().push((path.to_path_buf(), body));
        Ok(DispatchResult {
            path: path.to_path_buf(),
            status: 200,
            bytes_sent,
            attempts: 1,
            item_errors: 0,
            took_ms: None,
        })
    }
}
