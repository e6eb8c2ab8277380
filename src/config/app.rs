//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reporter::{DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT};
use crate::sampler::{DEFAULT_QUERY_TIMEOUT, TransportKind};
use crate::scheduler::{
    DEFAULT_CADENCE, DEFAULT_EMPTY_BACKOFF, DEFAULT_HANDOFF_TIMEOUT, SchedulerConfig,
};

use super::validation::{ConfigError, expand_env_vars, validate_endpoint};

// =============================================================================
// Constants
// =============================================================================

/// Default span of the usage query window (100 seconds).
pub const DEFAULT_WINDOW_SPAN: Duration = Duration::from_secs(100);

fn default_cadence() -> Duration {
    DEFAULT_CADENCE
}

fn default_window_span() -> Duration {
    DEFAULT_WINDOW_SPAN
}

fn default_empty_backoff() -> Duration {
    DEFAULT_EMPTY_BACKOFF
}

fn default_query_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}

fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::Wifi, TransportKind::Cellular]
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_handoff_timeout() -> Duration {
    DEFAULT_HANDOFF_TIMEOUT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

// =============================================================================
// Monitor Configuration
// =============================================================================

/// Sampling and attribution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Target time between cycle starts (default: 100ms).
    #[serde(default = "default_cadence", with = "humantime_serde")]
    pub cadence: Duration,

    /// Span of each usage query window (default: 100s).
    #[serde(default = "default_window_span", with = "humantime_serde")]
    pub window_span: Duration,

    /// Delay after a cycle with no usage (default: 50ms, `0s` to retry at once).
    #[serde(default = "default_empty_backoff", with = "humantime_serde")]
    pub empty_backoff: Duration,

    /// Bound on waiting for the usage source each cycle (default: 5s).
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,

    /// Transports queried each cycle, in order (default: wifi, cellular).
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,

    /// Declaring-unit prefixes whose frames are attributable.
    #[serde(default)]
    pub tracked_packages: Vec<String>,

    /// Process whose network namespace is read (default: the agent itself).
    #[serde(default)]
    pub pid: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            window_span: DEFAULT_WINDOW_SPAN,
            empty_backoff: DEFAULT_EMPTY_BACKOFF,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            transports: default_transports(),
            tracked_packages: Vec::new(),
            pid: None,
        }
    }
}

// =============================================================================
// Reporter Configuration
// =============================================================================

/// Remote collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Collector URL; supports `${VAR:-default}` expansion.
    pub endpoint: String,

    /// HTTP request timeout (default: 5s).
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Bound on handing one cycle's events to the queue (default: 50ms).
    #[serde(default = "default_handoff_timeout", with = "humantime_serde")]
    pub handoff_timeout: Duration,

    /// Pending batches held while the collector is slow (default: 64).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ReporterConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sampling settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Reporting settings.
    pub reporter: ReporterConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.reporter.endpoint = expand_env_vars(&config.reporter.endpoint);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitor = &self.monitor;
        let reporter = &self.reporter;

        if monitor.cadence.is_zero() {
            return Err(ConfigError::ValidationError(
                "monitor cadence must be positive".to_string(),
            ));
        }

        if monitor.window_span.is_zero() {
            return Err(ConfigError::ValidationError(
                "monitor window_span must be positive".to_string(),
            ));
        }

        if monitor.query_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "monitor query_timeout must be positive".to_string(),
            ));
        }

        if monitor.transports.is_empty() {
            return Err(ConfigError::ValidationError(
                "monitor transports cannot be empty".to_string(),
            ));
        }

        if monitor.tracked_packages.is_empty() {
            return Err(ConfigError::ValidationError(
                "monitor tracked_packages cannot be empty".to_string(),
            ));
        }

        if let Some(pos) = monitor.tracked_packages.iter().position(|p| p.is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "monitor tracked_packages[{}] is empty",
                pos
            )));
        }

        validate_endpoint(&reporter.endpoint)?;

        if reporter.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "reporter request_timeout must be positive".to_string(),
            ));
        }

        if reporter.handoff_timeout >= monitor.cadence {
            return Err(ConfigError::ValidationError(format!(
                "reporter handoff_timeout ({:?}) must be shorter than monitor cadence ({:?})",
                reporter.handoff_timeout, monitor.cadence
            )));
        }

        if reporter.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "reporter queue_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Poll loop timing derived from this configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_cadence(self.monitor.cadence)
            .with_empty_backoff(self.monitor.empty_backoff)
            .with_handoff_timeout(self.reporter.handoff_timeout)
    }
}
