//! Error types for memc-load using snafu.
//!
//! Line-level errors (`ParseError`, `EncodeError`, `DeliveryError`) are
//! recovered by the file processor and only counted. File-level and
//! run-level errors (`ReaderError`, `DiscoveryError`, `PipelineError`)
//! abort a unit of work.

use snafu::prelude::*;

use crate::metrics::events::RejectReason;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input pattern is empty.
    #[snafu(display("Input file pattern cannot be empty"))]
    EmptyPattern,

    /// No device types are routed anywhere.
    #[snafu(display("At least one device backend must be configured"))]
    NoBackends,

    /// A device type maps to an empty address.
    #[snafu(display("Backend address for device type '{dev_type}' cannot be empty"))]
    EmptyBackendAddress { dev_type: String },

    /// Batch size must be positive.
    #[snafu(display("Batch size must be greater than zero"))]
    ZeroBatchSize,

    /// Worker count must be positive.
    #[snafu(display("max_concurrent_files must be greater than zero"))]
    ZeroWorkers,

    /// Error tolerance outside (0, 1].
    #[snafu(display("Error rate tolerance must be in (0, 1], got {tolerance}"))]
    InvalidTolerance { tolerance: f64 },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Line Errors ============

/// Reasons a single input line is rejected by the parser.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseError {
    /// Line has fewer than five tab-separated fields.
    #[snafu(display("Expected at least 5 tab-separated fields, got {count}"))]
    TooFewFields { count: usize },

    #[snafu(display("Device type is empty"))]
    EmptyDeviceType,

    #[snafu(display("Device id is empty"))]
    EmptyDeviceId,

    #[snafu(display("Invalid latitude '{value}'"))]
    InvalidLatitude {
        value: String,
        source: std::num::ParseFloatError,
    },

    #[snafu(display("Invalid longitude '{value}'"))]
    InvalidLongitude {
        value: String,
        source: std::num::ParseFloatError,
    },
}

/// Errors converting a record into its binary payload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EncodeError {
    /// App id does not fit an unsigned 32-bit integer.
    #[snafu(display("App id {app_id} is outside the uint32 range"))]
    AppIdOutOfRange { app_id: i64 },
}

/// Errors decoding a binary payload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("Invalid UserApps payload"))]
    Payload { source: prost::DecodeError },
}

// ============ Delivery Errors ============

/// Errors that can occur while writing to a memcached backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeliveryError {
    /// Could not open a connection to the backend.
    #[snafu(display("Failed to connect to memcached at {addr}"))]
    Connect {
        addr: String,
        source: memcache::MemcacheError,
    },

    /// The backend rejected a command or the connection broke mid-command.
    #[snafu(display("memcached command failed at {addr}"))]
    Command {
        addr: String,
        source: memcache::MemcacheError,
    },

    /// Key is not a valid memcached key.
    #[snafu(display("Malformed memcached key '{key}'"))]
    InvalidKey { key: String },

    /// Blocking client task failed to join.
    #[snafu(display("memcached task failed for {addr}"))]
    DeliveryJoin {
        addr: String,
        source: tokio::task::JoinError,
    },
}

/// Why a record was dropped instead of delivered.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RecordError {
    #[snafu(display("Malformed line"))]
    Parse { source: ParseError },

    #[snafu(display("Unknown device type: {dev_type}"))]
    UnknownDeviceType { dev_type: String },

    #[snafu(display("Cannot encode payload for {key}"))]
    Encode { key: String, source: EncodeError },

    #[snafu(display("Cannot write {key} to memc {addr}"))]
    Delivery {
        key: String,
        addr: String,
        source: DeliveryError,
    },
}

impl RecordError {
    /// Metrics label for this rejection.
    pub fn reason(&self) -> RejectReason {
        match self {
            RecordError::Parse { .. } => RejectReason::Parse,
            RecordError::UnknownDeviceType { .. } => RejectReason::UnknownDevice,
            RecordError::Encode { .. } => RejectReason::Encode,
            RecordError::Delivery { .. } => RejectReason::Delivery,
        }
    }
}

// ============ Reader Errors ============

/// Errors that can occur while reading a gzip input file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The file could not be opened.
    #[snafu(display("Failed to open {path}"))]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Blocking reader task failed to join.
    #[snafu(display("Reader task failed for {path}"))]
    ReaderJoin {
        path: String,
        source: tokio::task::JoinError,
    },
}

// ============ Discovery Errors ============

/// Errors expanding the input pattern.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DiscoveryError {
    #[snafu(display("Invalid file pattern '{pattern}'"))]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level errors that abort a whole run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// File discovery error.
    #[snafu(display("File discovery failed"))]
    Discovery { source: DiscoveryError },

    /// Log file could not be opened.
    #[snafu(display("Error opening log file {path}"))]
    LogFile {
        path: String,
        source: std::io::Error,
    },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// The run finished but at least one file failed its load.
    #[snafu(display("Load failed for {failed} file(s), {aborted} of them aborted"))]
    LoadFailed { failed: usize, aborted: usize },
}
