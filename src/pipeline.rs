//! Wiring for the two watcher loops

use crate::config::PipelineConfig;
use crate::dispatch::{BulkSink, IngestDispatcher, RetryPolicy};
use crate::error::PipelineResult;
use crate::transform::{CaptureDecoder, RecordTransformer, TsharkDecoder};
use crate::watcher::{CleanedDataWatcher, RawDataWatcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Create the raw and cleaned directories if they are missing
pub async fn ensure_directories(config: &PipelineConfig) -> PipelineResult<()> {
    tokio::fs::create_dir_all(&config.paths.raw_dir).await?;
    tokio::fs::create_dir_all(&config.paths.cleaned_dir).await?;
    Ok(())
}

pub struct Pipeline {
    raw: RawDataWatcher,
    cleaned: CleanedDataWatcher,
}

impl Pipeline {
    /// Production wiring: external decoder, HTTP dispatcher with the configured retry policy
    pub async fn build(config: &PipelineConfig, cancel: &CancellationToken) -> PipelineResult<Self> {
        let decoder = Box::new(TsharkDecoder::from_config(&config.decoder));
        let dispatcher = IngestDispatcher::new(&config.ingest, RetryPolicy::from_config(&config.retry))?
            .with_shutdown(cancel.clone());
        Self::with_components(config, decoder, Arc::new(dispatcher)).await
    }

    pub async fn with_components(
        config: &PipelineConfig,
        decoder: Box<dyn CaptureDecoder>,
        sink: Arc<dyn BulkSink>,
    ) -> PipelineResult<Self> {
        let transformer = RecordTransformer::new(decoder, config.paths.cleaned_dir.clone())?;
        let raw = RawDataWatcher::new(config, transformer).await?;
        let cleaned = CleanedDataWatcher::new(config, sink).await?;
        Ok(Self { raw, cleaned })
    }

    /// Run both loops as independent tasks until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let raw_task = tokio::spawn(self.raw.run(cancel.clone()));
        let cleaned_task = tokio::spawn(self.cleaned.run(cancel.clone()));

        let (raw_result, cleaned_result) = tokio::join!(raw_task, cleaned_task);
        if let Err(e) = raw_result {
            error!("Raw watcher task failed: {}", e);
        }
        if let Err(e) = cleaned_result {
            error!("Cleaned watcher task failed: {}", e);
        }
        info!("Pipeline stopped");
    }
}
