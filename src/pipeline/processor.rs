//! Per-file processing: read, parse, route, encode, deliver, gate, mark.

use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    DeliverySnafu, EncodeSnafu, ParseSnafu, RecordError, UnknownDeviceTypeSnafu,
};
use crate::metrics::events::{
    FileMarkFailed, FileProcessed, FileProcessingCompleted, FileStatus, LineRejected,
    RecordsDelivered, RejectReason,
};
use crate::sink::{ConnectionPool, DeliveryClient, UserApps};
use crate::source::{LineStream, parse_line};

use super::marker::mark_processed;
use super::verdict::{ErrorRateGate, FileStats, Verdict};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// The file was read to the end (or to a mid-stream decompression error).
    Completed {
        path: PathBuf,
        stats: FileStats,
        verdict: Verdict,
        /// Whether the marker rename succeeded.
        marked: bool,
    },
    /// The file could not be opened or decompressed; it was left untouched.
    Aborted { path: PathBuf, error: String },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Completed { path, .. } | FileOutcome::Aborted { path, .. } => path,
        }
    }

    pub fn status(&self) -> FileStatus {
        match self {
            FileOutcome::Aborted { .. } => FileStatus::Aborted,
            FileOutcome::Completed { verdict, .. } => match verdict {
                Verdict::Acceptable { .. } => FileStatus::Acceptable,
                Verdict::HighErrorRate { .. } => FileStatus::HighErrorRate,
                Verdict::NotEvaluated => FileStatus::NotEvaluated,
            },
        }
    }

    /// A file fails the run when it was aborted, crossed the error
    /// tolerance, or produced errors without delivering anything.
    pub fn is_failure(&self) -> bool {
        match self {
            FileOutcome::Aborted { .. } => true,
            FileOutcome::Completed { stats, verdict, .. } => match verdict {
                Verdict::Acceptable { .. } => false,
                Verdict::HighErrorRate { .. } => true,
                Verdict::NotEvaluated => stats.errors > 0,
            },
        }
    }
}

/// Drives one input file through the load.
///
/// Cheap to share: all state is behind `Arc`s, and every call to
/// [`FileProcessor::process`] keeps its own tallies.
#[derive(Debug, Clone)]
pub struct FileProcessor {
    routes: Arc<BTreeMap<String, String>>,
    delivery: DeliveryClient,
    gate: ErrorRateGate,
    batch_size: usize,
}

impl FileProcessor {
    pub fn new(
        routes: BTreeMap<String, String>,
        delivery: DeliveryClient,
        gate: ErrorRateGate,
        batch_size: usize,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            delivery,
            gate,
            batch_size,
        }
    }

    /// Build a processor from configuration, delivering through `pool`.
    pub fn from_config(config: &Config, pool: Arc<ConnectionPool>) -> Self {
        Self::new(
            config.backends.clone(),
            DeliveryClient::new(pool, config.dry_run),
            ErrorRateGate::new(config.error_handling.max_error_rate),
            config.source.batch_size,
        )
    }

    /// Process `path` end to end.
    ///
    /// Per-line problems are counted, never propagated. Once the file has
    /// been opened it is always renamed with the marker prefix, whatever
    /// the verdict; a file that cannot be opened is left as is.
    pub async fn process(&self, path: &Path) -> FileOutcome {
        let start = Instant::now();
        info!("Processing {}", path.display());

        let mut lines = match LineStream::open(path, self.batch_size).await {
            Ok(lines) => lines,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Error opening file");
                emit!(FileProcessed {
                    status: FileStatus::Aborted
                });
                return FileOutcome::Aborted {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                };
            }
        };

        let mut stats = FileStats::default();
        while let Some(batch) = lines.next_batch().await {
            match batch {
                Ok(batch) => {
                    for line in &batch {
                        self.process_line(line, &mut stats).await;
                    }
                }
                Err(e) => {
                    error!(
                        file = %path.display(),
                        error = %e,
                        "Decompression failed mid-file, treating the rest as lost"
                    );
                    stats.errors += 1;
                    emit!(LineRejected {
                        reason: RejectReason::Decompress
                    });
                    break;
                }
            }
        }

        let verdict = self.gate.evaluate(path, &stats);
        let marked = match mark_processed(path).await {
            Ok(target) => {
                debug!("Renamed {} to {}", path.display(), target.display());
                true
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "Error renaming file");
                emit!(FileMarkFailed);
                false
            }
        };

        let outcome = FileOutcome::Completed {
            path: path.to_path_buf(),
            stats,
            verdict,
            marked,
        };
        emit!(FileProcessed {
            status: outcome.status()
        });
        emit!(FileProcessingCompleted {
            duration: start.elapsed()
        });
        debug!(
            "Finished {} ({} delivered, {} errors)",
            path.display(),
            stats.processed,
            stats.errors
        );
        outcome
    }

    async fn process_line(&self, line: &str, stats: &mut FileStats) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match self.load_record(line).await {
            Ok(()) => {
                stats.processed += 1;
                emit!(RecordsDelivered { count: 1 });
            }
            Err(e) => {
                stats.errors += 1;
                let reason = e.reason();
                match &e {
                    RecordError::Parse { source } => debug!("Skipping line: {}", source),
                    RecordError::Delivery { source, .. } => error!("{}: {}", e, source),
                    RecordError::Encode { source, .. } => warn!("{}: {}", e, source),
                    RecordError::UnknownDeviceType { .. } => warn!("{}", e),
                }
                emit!(LineRejected { reason });
            }
        }
    }

    /// Parse, route, encode, and deliver one non-empty line.
    async fn load_record(&self, line: &str) -> Result<(), RecordError> {
        let record = parse_line(line).context(ParseSnafu)?;
        let addr = self
            .routes
            .get(&record.dev_type)
            .context(UnknownDeviceTypeSnafu {
                dev_type: &record.dev_type,
            })?;
        let key = record.key();
        let payload = UserApps::try_from(&record).context(EncodeSnafu { key: &key })?;
        self.delivery
            .deliver(addr, &key, &payload)
            .await
            .context(DeliverySnafu { key: &key, addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn dry_run_processor() -> FileProcessor {
        let config = Config {
            dry_run: true,
            ..Config::default()
        };
        FileProcessor::from_config(&config, Arc::new(ConnectionPool::new()))
    }

    fn write_gz(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut encoder =
            GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    #[tokio::test]
    async fn test_dry_run_counts_and_marks() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            "a.tsv.gz",
            &[
                "idfa\tid1\t55.55\t37.37\t42,43",
                "",
                "   ",
                "gaid\tid2\t1.0\t2.0\t1",
                "weird\tid3\t1.0\t1.0\t1",
                "adid\tid4\tbad\t1.0\t1",
                "dvid\tid5\t1.0\t1.0\t-3",
            ],
        );

        let outcome = dry_run_processor().process(&path).await;
        match &outcome {
            FileOutcome::Completed {
                stats,
                verdict,
                marked,
                ..
            } => {
                assert_eq!(
                    *stats,
                    FileStats {
                        processed: 2,
                        errors: 3
                    }
                );
                assert!(matches!(verdict, Verdict::HighErrorRate { .. }));
                assert!(*marked);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(outcome.is_failure());
        assert!(!path.exists());
        assert!(dir.path().join(".a.tsv.gz").exists());
    }

    #[tokio::test]
    async fn test_unopenable_file_is_not_marked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.tsv.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let outcome = dry_run_processor().process(&path).await;
        assert!(matches!(outcome, FileOutcome::Aborted { .. }));
        assert_eq!(outcome.status(), FileStatus::Aborted);
        assert!(path.exists());
        assert!(!dir.path().join(".broken.tsv.gz").exists());
    }

    #[tokio::test]
    async fn test_only_errors_is_not_evaluated_but_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "bad.tsv.gz", &["garbage", "more garbage"]);

        let outcome = dry_run_processor().process(&path).await;
        match &outcome {
            FileOutcome::Completed { stats, verdict, .. } => {
                assert_eq!(stats.errors, 2);
                assert_eq!(*verdict, Verdict::NotEvaluated);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(outcome.is_failure());
        assert!(dir.path().join(".bad.tsv.gz").exists());
    }

    #[tokio::test]
    async fn test_lines_spanning_batches() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..250)
            .map(|i| format!("idfa\tdev{i}\t1.0\t2.0\t{i}"))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_gz(&dir, "many.tsv.gz", &refs);

        let mut config = Config {
            dry_run: true,
            ..Config::default()
        };
        config.source.batch_size = 7;
        let processor = FileProcessor::from_config(&config, Arc::new(ConnectionPool::new()));

        match processor.process(&path).await {
            FileOutcome::Completed { stats, verdict, .. } => {
                assert_eq!(stats.processed, 250);
                assert_eq!(stats.errors, 0);
                assert_eq!(verdict, Verdict::Acceptable { rate: 0.0 });
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
