//! Pipeline configuration
//!
//! Everything the watchers, the transformer, the dispatcher and the bootstrap
//! sequence need is collected into one [`PipelineConfig`], loaded once at
//! startup from `packet-ingest.toml` and handed to each component by reference.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "packet-ingest.toml";
pub const ENV_ELASTIC_USER: &str = "PACKET_INGEST_ELASTIC_USER";
pub const ENV_ELASTIC_PASSWORD: &str = "PACKET_INGEST_ELASTIC_PASSWORD";

/// Top-level configuration, one section per component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub decoder: DecoderConfig,
    pub ingest: IngestConfig,
    pub watch: WatchConfig,
    pub retry: RetryConfig,
    pub services: Vec<ServiceConfig>,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            decoder: DecoderConfig::default(),
            ingest: IngestConfig::default(),
            watch: WatchConfig::default(),
            retry: RetryConfig::default(),
            services: ServiceConfig::default_stack(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory the capture tool writes `.pcapng` files into
    pub raw_dir: PathBuf,
    /// Directory cleaned record files are written to (and dispatched from)
    pub cleaned_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            cleaned_dir: PathBuf::from("data/cleaned"),
        }
    }
}

/// External capture decoder (`tshark -r <file> -T ek`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub program: String,
    /// Export format handed to `-T`
    pub format: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "tshark".to_string(),
            format: "ek".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Base URL of the bulk ingestion endpoint, without `/_bulk`
    pub endpoint: String,
    /// Ingest pipeline applied server-side
    pub pipeline: String,
    pub username: String,
    pub password: String,
    pub request_timeout_ms: u64,
    /// Remove the cleaned file after a successful dispatch
    pub delete_after_dispatch: bool,
    /// Dispatch files already sitting in the cleaned directory at startup
    pub replay_existing: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            pipeline: "packets".to_string(),
            username: "elastic".to_string(),
            password: String::new(),
            request_timeout_ms: 30_000,
            delete_after_dispatch: false,
            replay_existing: false,
        }
    }
}

impl IngestConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Only raw files with this suffix are tracked
    pub raw_suffix: String,
    /// Only cleaned files with this suffix are dispatched
    pub cleaned_suffix: String,
    pub raw_poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub cleaned_poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            raw_suffix: ".pcapng".to_string(),
            cleaned_suffix: ".json".to_string(),
            raw_poll_interval_ms: 2_000,
            settle_delay_ms: 2_000,
            cleaned_poll_interval_ms: 2_000,
        }
    }
}

impl WatchConfig {
    pub fn raw_poll_interval(&self) -> Duration {
        Duration::from_millis(self.raw_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cleaned_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cleaned_poll_interval_ms)
    }
}

/// Dispatch retry policy. One attempt means no retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

/// A dependent service started during bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub health_url: String,
    /// HTTP statuses that count as ready
    pub ready_statuses: Vec<u16>,
    pub poll_interval_ms: u64,
    /// Give up waiting after this long. `None` waits forever.
    pub max_wait_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            program: String::new(),
            args: Vec::new(),
            working_dir: None,
            health_url: String::new(),
            ready_statuses: vec![200],
            poll_interval_ms: 5_000,
            max_wait_ms: None,
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    /// Search server, dashboard and log pipeline, in start order
    pub fn default_stack() -> Vec<ServiceConfig> {
        vec![
            ServiceConfig {
                name: "elasticsearch".to_string(),
                program: "elasticsearch".to_string(),
                health_url: "http://localhost:9200".to_string(),
                ready_statuses: vec![200, 401], // 401 = up with security enabled
                poll_interval_ms: 5_000,
                ..Default::default()
            },
            ServiceConfig {
                name: "kibana".to_string(),
                program: "kibana".to_string(),
                health_url: "http://localhost:5601".to_string(),
                poll_interval_ms: 10_000,
                ..Default::default()
            },
            ServiceConfig {
                name: "logstash".to_string(),
                program: "logstash".to_string(),
                args: vec!["-f".to_string(), "logstash.conf".to_string()],
                health_url: "http://localhost:9600".to_string(),
                poll_interval_ms: 5_000,
                ..Default::default()
            },
        ]
    }
}

/// Continuous ring-buffer capture feeding the raw directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub program: String,
    pub interface: String,
    /// Packets per ring-buffer file (`-b packets:<n>`)
    pub packets_per_file: u32,
    /// Base file name inside the raw directory
    pub file_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "tshark".to_string(),
            interface: "4".to_string(),
            packets_per_file: 250,
            file_name: "packets_.pcapng".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            filter: "packet_ingest=info".to_string(),
        }
    }
}

/// Basic-auth credentials for the ingestion endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults when it doesn't exist.
    ///
    /// Environment overrides and path expansion are applied, then the result is validated.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let parsed = Self::from_toml_str(&content)?;
            debug!("Loaded configuration from: {}", path.display());
            parsed
        } else {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Self::default()
        };

        config.apply_env_overrides();
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml_string(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Credentials from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var(ENV_ELASTIC_USER) {
            debug!("Using ingest username from {}", ENV_ELASTIC_USER);
            self.ingest.username = user;
        }
        if let Ok(password) = std::env::var(ENV_ELASTIC_PASSWORD) {
            debug!("Using ingest password from {}", ENV_ELASTIC_PASSWORD);
            self.ingest.password = password;
        }
    }

    /// Expand `~` and `$VAR` in every configured directory
    pub fn expand_paths(&mut self) -> PipelineResult<()> {
        self.paths.raw_dir = expand(&self.paths.raw_dir)?;
        self.paths.cleaned_dir = expand(&self.paths.cleaned_dir)?;
        self.logging.dir = expand(&self.logging.dir)?;
        for service in &mut self.services {
            if let Some(dir) = &service.working_dir {
                service.working_dir = Some(expand(dir)?);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.ingest.pipeline.trim().is_empty() {
            return Err(PipelineError::Config(
                "ingest.pipeline must not be empty".to_string(),
            ));
        }
        if self.paths.raw_dir == self.paths.cleaned_dir {
            return Err(PipelineError::Config(format!(
                "raw_dir and cleaned_dir must differ (both {})",
                self.paths.raw_dir.display()
            )));
        }
        if self.watch.raw_poll_interval_ms == 0
            || self.watch.settle_delay_ms == 0
            || self.watch.cleaned_poll_interval_ms == 0
        {
            return Err(PipelineError::Config(
                "watch intervals must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(PipelineError::Config(
                "retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        for service in &self.services {
            if service.name.is_empty() || service.health_url.is_empty() {
                return Err(PipelineError::Config(
                    "every service needs a name and a health_url".to_string(),
                ));
            }
            if service.poll_interval_ms == 0 {
                return Err(PipelineError::Config(format!(
                    "service {} has a zero poll interval",
                    service.name
                )));
            }
        }
        Ok(())
    }
}

fn expand(path: &Path) -> PipelineResult<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| PipelineError::Config(format!("Failed to expand {}: {}", raw, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
