// Service Health Probing
//
// Each dependent service exposes an HTTP root that answers once it is up.
// A probe turns one GET into a readiness level the sequencer can act on.

use crate::config::ServiceConfig;
use crate::error::{PipelineError, PipelineResult};
use std::time::Duration;
use tracing::debug;

/// Readiness of one service after a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Answered with an accepted status
    Ready(u16),
    /// Answered, but not with an accepted status yet
    NotReady(u16),
    /// No answer at all (connection refused, timeout, ...)
    Error(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Readiness::Ready(status) => format!("ready ({})", status),
            Readiness::NotReady(status) => format!("not yet available ({})", status),
            Readiness::Error(reason) => format!("not reachable ({})", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
    accepted: Vec<u16>,
}

impl HealthProbe {
    pub fn new(url: impl Into<String>, accepted: Vec<u16>) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            accepted,
        })
    }

    pub fn for_service(service: &ServiceConfig) -> PipelineResult<Self> {
        Self::new(service.health_url.clone(), service.ready_statuses.clone())
    }

    pub async fn check(&self) -> Readiness {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("Health probe {} answered {}", self.url, status);
                if self.accepted.contains(&status) {
                    Readiness::Ready(status)
                } else {
                    Readiness::NotReady(status)
                }
            }
            Err(e) => Readiness::Error(e.to_string()),
        }
    }
}
