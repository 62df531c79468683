//! Loader configuration.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags in `main`. Every field has a default, so an empty
//! document (or no file at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyBackendAddressSnafu, EmptyPatternSnafu, InvalidToleranceSnafu,
    NoBackendsSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu, ZeroWorkersSnafu,
};

/// Error rate at or above which a file load is reported as failed.
pub const NORMAL_ERR_RATE: f64 = 0.01;

/// Device types routed by default, with their memcached addresses.
pub const DEFAULT_BACKENDS: [(&str, &str); 4] = [
    ("idfa", "127.0.0.1:33013"),
    ("gaid", "127.0.0.1:33014"),
    ("adid", "127.0.0.1:33015"),
    ("dvid", "127.0.0.1:33016"),
];

/// Main configuration structure for a load run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    /// Device type -> memcached address.
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, String>,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Log intended writes instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            backends: default_backends(),
            error_handling: ErrorHandlingConfig::default(),
            metrics: MetricsConfig::default(),
            dry_run: false,
        }
    }
}

fn default_backends() -> BTreeMap<String, String> {
    DEFAULT_BACKENDS
        .iter()
        .map(|(dev_type, addr)| (dev_type.to_string(), addr.to_string()))
        .collect()
}

/// Input file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Glob pattern for input files.
    /// Example: "/data/appsinstalled/*.tsv.gz"
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Lines handed from the reader thread to the processor at once (default: 1024).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of files processed concurrently (default: 4).
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            batch_size: default_batch_size(),
            max_concurrent_files: default_max_concurrent_files(),
        }
    }
}

fn default_pattern() -> String {
    "data/appsinstalled/*.tsv.gz".to_string()
}

fn default_batch_size() -> usize {
    1024
}

fn default_max_concurrent_files() -> usize {
    4
}

/// Error-rate gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Error rate (errors / delivered) at or above which a file load fails.
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            max_error_rate: default_max_error_rate(),
        }
    }
}

fn default_max_error_rate() -> f64 {
    NORMAL_ERR_RATE
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to serve metrics (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.pattern.trim().is_empty(), EmptyPatternSnafu);
        ensure!(self.source.batch_size > 0, ZeroBatchSizeSnafu);
        ensure!(self.source.max_concurrent_files > 0, ZeroWorkersSnafu);
        ensure!(!self.backends.is_empty(), NoBackendsSnafu);
        for (dev_type, addr) in &self.backends {
            ensure!(
                !addr.trim().is_empty(),
                EmptyBackendAddressSnafu { dev_type }
            );
        }
        let tolerance = self.error_handling.max_error_rate;
        ensure!(
            tolerance.is_finite() && tolerance > 0.0 && tolerance <= 1.0,
            InvalidToleranceSnafu { tolerance }
        );
        Ok(())
    }
}
