//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the loader.
//! Without an installed recorder the `metrics` macros are no-ops, so
//! events are always safe to emit.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records are written to a backend (or logged in dry-run).
pub struct RecordsDelivered {
    pub count: u64,
}

impl InternalEvent for RecordsDelivered {
    fn emit(self) {
        trace!(count = self.count, "Records delivered");
        counter!("memc_load_records_delivered_total").increment(self.count);
    }
}

/// Why a line did not turn into a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Parse,
    UnknownDevice,
    Encode,
    Delivery,
    Decompress,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Parse => "parse",
            RejectReason::UnknownDevice => "unknown_device",
            RejectReason::Encode => "encode",
            RejectReason::Delivery => "delivery",
            RejectReason::Decompress => "decompress",
        }
    }
}

/// Event emitted when a line is counted as an error.
pub struct LineRejected {
    pub reason: RejectReason,
}

impl InternalEvent for LineRejected {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "Line rejected");
        counter!("memc_load_lines_rejected_total", "reason" => self.reason.as_str()).increment(1);
    }
}

/// Final status of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Acceptable,
    HighErrorRate,
    NotEvaluated,
    Aborted,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Acceptable => "acceptable",
            FileStatus::HighErrorRate => "high_error_rate",
            FileStatus::NotEvaluated => "not_evaluated",
            FileStatus::Aborted => "aborted",
        }
    }
}

/// Event emitted when an input file finishes processing.
pub struct FileProcessed {
    pub status: FileStatus,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "File processed");
        counter!("memc_load_files_processed_total", "status" => self.status.as_str())
            .increment(1);
    }
}

/// Event emitted when a processed file could not be renamed.
pub struct FileMarkFailed;

impl InternalEvent for FileMarkFailed {
    fn emit(self) {
        trace!("File mark failed");
        counter!("memc_load_file_mark_failures_total").increment(1);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a single memcached `set` completes.
pub struct DeliveryCompleted {
    pub duration: Duration,
}

impl InternalEvent for DeliveryCompleted {
    fn emit(self) {
        trace!(
            duration_us = self.duration.as_micros(),
            "Delivery completed"
        );
        histogram!("memc_load_delivery_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a whole file has been processed.
pub struct FileProcessingCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileProcessingCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File processing completed"
        );
        histogram!("memc_load_file_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Gauge events for concurrency
// ============================================================================

/// Event emitted when the number of in-flight files changes.
pub struct ActiveFiles {
    pub count: usize,
}

impl InternalEvent for ActiveFiles {
    fn emit(self) {
        trace!(count = self.count, "Active files");
        gauge!("memc_load_active_files").set(self.count as f64);
    }
}

/// Event emitted when the connection pool grows.
pub struct PooledConnections {
    pub count: usize,
}

impl InternalEvent for PooledConnections {
    fn emit(self) {
        trace!(count = self.count, "Pooled connections");
        gauge!("memc_load_pooled_clients").set(self.count as f64);
    }
}
