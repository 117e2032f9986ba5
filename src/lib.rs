// Packet Ingest - capture file watcher and bulk ingestion relay
//!
//! Watches a raw capture directory, decodes each finished capture into
//! line-delimited bulk records, strips the deprecated type tag, and posts the
//! cleaned files to a bulk ingestion endpoint through a named pipeline.

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod transform;
pub mod watcher;

#[cfg(test)]
pub mod tests;

// Re-export common types
pub use config::{Credentials, PipelineConfig};
pub use dispatch::{BulkSink, DispatchResult, IngestDispatcher, RetryPolicy};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::Pipeline;
pub use transform::{CaptureDecoder, RecordTransformer, TsharkDecoder};
pub use watcher::{CleanedDataWatcher, RawDataWatcher, SizeStabilityDetector};
