//! Configuration module for the network monitor.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Monitor settings (cadence, window span, transports, tracked packages)
//! - Reporter settings (endpoint, timeouts, queue capacity)

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_WINDOW_SPAN, MonitorConfig, ReporterConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration, validate_endpoint};
