//! Bulk Ingestion Dispatch
//!
//! Posts cleaned record files verbatim to `<endpoint>/_bulk?pipeline=<name>`
//! as `application/x-ndjson` with basic auth. The cleaned watcher only sees
//! the [`BulkSink`] trait, so the loop can be exercised without a network.

pub mod retry;

use crate::config::{Credentials, IngestConfig};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use retry::{AttemptError, RetryPolicy};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Receives cleaned record files from the cleaned watcher
#[async_trait]
pub trait BulkSink: Send + Sync {
    async fn send(&self, path: &Path) -> PipelineResult<DispatchResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub path: PathBuf,
    pub status: u16,
    pub bytes_sent: usize,
    pub attempts: u32,
    /// Items the endpoint accepted the request for but rejected individually
    pub item_errors: usize,
    pub took_ms: Option<u64>,
}

/// Subset of the bulk API response we look at
#[derive(Debug, Default, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    took: Option<u64>,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl BulkResponse {
    fn failed_items(&self) -> usize {
        self.items
            .iter()
            .filter_map(|item| item.as_object())
            .filter(|item| {
                item.values()
                    .any(|action| action.get("error").is_some_and(|e| !e.is_null()))
            })
            .count()
    }
}

pub struct IngestDispatcher {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    pipeline: String,
    retry: RetryPolicy,
    shutdown: Option<CancellationToken>,
}

impl IngestDispatcher {
    pub fn new(config: &IngestConfig, retry: RetryPolicy) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credentials: config.credentials(),
            pipeline: config.pipeline.clone(),
            retry,
            shutdown: None,
        })
    }

    /// Abandon pending retries once `token` fires
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.endpoint)
    }

    /// Single POST of `path` through `pipeline`. Non-2xx and network errors are `DispatchFailed`.
    pub async fn dispatch(
        &self,
        path: &Path,
        credentials: &Credentials,
        pipeline: &str,
    ) -> PipelineResult<DispatchResult> {
        self.attempt(path, credentials, pipeline, 1)
            .await
            .map_err(|e| PipelineError::DispatchFailed {
                path: path.to_path_buf(),
                reason: e.message().to_string(),
            })
    }

    /// Dispatch with the configured credentials, pipeline and retry policy
    pub async fn dispatch_with_retry(&self, path: &Path) -> PipelineResult<DispatchResult> {
        let outcome = self
            .retry
            .run("bulk dispatch", self.shutdown.as_ref(), |attempt| {
                self.attempt(path, &self.credentials, &self.pipeline, attempt)
            })
            .await;

        match outcome {
            Ok((result, _)) => Ok(result),
            Err((err, attempts)) => Err(PipelineError::DispatchFailed {
                path: path.to_path_buf(),
                reason: format!("{} (after {} attempt(s))", err.message(), attempts),
            }),
        }
    }

    async fn attempt(
        &self,
        path: &Path,
        credentials: &Credentials,
        pipeline: &str,
        attempt: u32,
    ) -> Result<DispatchResult, AttemptError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| AttemptError::NonRetriable(format!("cannot read {}: {}", path.display(), e)))?;
        let bytes_sent = body.len();

        debug!(
            "POST {}?pipeline={} ({} bytes, attempt {})",
            self.bulk_url(),
            pipeline,
            bytes_sent,
            attempt
        );

        let response = self
            .client
            .post(self.bulk_url())
            .query(&[("pipeline", pipeline)])
            .header(reqwest::header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .body(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let text = response.text().await.unwrap_or_default();
        let parsed: BulkResponse = serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!("Bulk response was not JSON ({}), skipping item check", e);
            BulkResponse::default()
        });

        let item_errors = if parsed.errors { parsed.failed_items() } else { 0 };
        if item_errors > 0 {
            warn!(
                "{}: endpoint rejected {} of {} items",
                path.display(),
                item_errors,
                parsed.items.len()
            );
        }

        info!(
            "Dispatched {} ({} bytes, status {})",
            path.display(),
            bytes_sent,
            status.as_u16()
        );

        Ok(DispatchResult {
            path: path.to_path_buf(),
            status: status.as_u16(),
            bytes_sent,
            attempts: attempt,
            item_errors,
            took_ms: parsed.took,
        })
    }
}

#[async_trait]
impl BulkSink for IngestDispatcher {
    async fn send(&self, path: &Path) -> PipelineResult<DispatchResult> {
        self.dispatch_with_retry(path).await
    }
}

fn classify_transport_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        AttemptError::NonRetriable(format!("invalid request: {}", err))
    } else {
        // Connection refused, reset, timeout
        AttemptError::Retriable(format!("request failed: {}", err))
    }
}

fn classify_status(status: StatusCode, body: &str) -> AttemptError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("endpoint returned {}: {}", status, snippet.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AttemptError::Retriable(message)
    } else {
        AttemptError::NonRetriable(message)
    }
}
