//! Error-rate gate applied to each fully consumed file.

use std::path::Path;
use tracing::{error, info};

use crate::config::NORMAL_ERR_RATE;

/// Per-file tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Records delivered (or logged in dry-run).
    pub processed: usize,
    /// Lines that failed parsing, routing, encoding, or delivery.
    pub errors: usize,
}

impl FileStats {
    /// `errors / processed`, or `None` when nothing was delivered.
    pub fn error_rate(&self) -> Option<f64> {
        (self.processed > 0).then(|| self.errors as f64 / self.processed as f64)
    }
}

/// Result of gating one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Error rate strictly below the tolerance.
    Acceptable { rate: f64 },
    /// Error rate at or above the tolerance.
    HighErrorRate { rate: f64 },
    /// No record was delivered, so no rate exists.
    NotEvaluated,
}

/// Compares a file's error rate against a fixed tolerance.
#[derive(Debug, Clone, Copy)]
pub struct ErrorRateGate {
    tolerance: f64,
}

impl Default for ErrorRateGate {
    fn default() -> Self {
        Self::new(NORMAL_ERR_RATE)
    }
}

impl ErrorRateGate {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Decide and log the verdict for `stats`.
    pub fn evaluate(&self, path: &Path, stats: &FileStats) -> Verdict {
        let Some(rate) = stats.error_rate() else {
            return Verdict::NotEvaluated;
        };

        if rate < self.tolerance {
            info!(
                file = %path.display(),
                processed = stats.processed,
                errors = stats.errors,
                "Acceptable error rate ({:.2}). Successful load",
                rate
            );
            Verdict::Acceptable { rate }
        } else {
            error!(
                file = %path.display(),
                processed = stats.processed,
                errors = stats.errors,
                "High error rate ({:.2} > {:.2}). Failed load",
                rate,
                self.tolerance
            );
            Verdict::HighErrorRate { rate }
        }
    }
}
