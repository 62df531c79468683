//! Main load pipeline.
//!
//! Discovers input files and runs a [`FileProcessor`] for each of them,
//! at most `max_concurrent_files` at a time.
//!
//! # Architecture
//!
//! - **Tokio tasks**: one per in-flight file, delivering records to memcached (I/O bound)
//! - **Tokio's blocking thread pool**: gzip decompression for each file (CPU bound)
//!
//! All file tasks share one [`ConnectionPool`], so each backend address is
//! served by a single client for the whole run.

pub mod marker;
pub mod processor;
pub mod verdict;

use futures::stream::{FuturesUnordered, StreamExt};
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::emit;
use crate::error::{ConfigSnafu, DiscoverySnafu, PipelineError};
use crate::metrics::LoadProgress;
use crate::metrics::events::{ActiveFiles, FileProcessed, FileStatus};
use crate::sink::ConnectionPool;
use crate::source::discover_files;

pub use marker::{MARKER_PREFIX, mark_processed, marked_path};
pub use processor::{FileOutcome, FileProcessor};
pub use verdict::{ErrorRateGate, FileStats, Verdict};

/// Totals across every file of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_total: usize,
    pub acceptable: usize,
    pub high_error_rate: usize,
    pub not_evaluated: usize,
    pub aborted: usize,
    /// Files whose outcome fails the run (see [`FileOutcome::is_failure`]).
    pub failed: usize,
    pub records_processed: usize,
    pub records_failed: usize,
}

impl RunSummary {
    /// Fold one file outcome into the totals.
    pub fn record(&mut self, outcome: &FileOutcome) {
        self.files_total += 1;
        if outcome.is_failure() {
            self.failed += 1;
        }
        match outcome {
            FileOutcome::Aborted { .. } => self.aborted += 1,
            FileOutcome::Completed { stats, verdict, .. } => {
                self.records_processed += stats.processed;
                self.records_failed += stats.errors;
                match verdict {
                    Verdict::Acceptable { .. } => self.acceptable += 1,
                    Verdict::HighErrorRate { .. } => self.high_error_rate += 1,
                    Verdict::NotEvaluated => self.not_evaluated += 1,
                }
            }
        }
    }

    /// A file task that panicked or was cancelled.
    fn record_lost_task(&mut self) {
        self.files_total += 1;
        self.aborted += 1;
        self.failed += 1;
    }

    /// True when no file failed its load.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

type FileTask = JoinHandle<FileOutcome>;

/// Main load pipeline.
pub struct Pipeline {
    config: Config,
    pool: Arc<ConnectionPool>,
    processor: FileProcessor,
    progress: LoadProgress,
}

impl Pipeline {
    /// Validate `config` and set up one client per configured backend.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate().context(ConfigSnafu)?;

        let pool = Arc::new(ConnectionPool::with_addresses(config.backends.values()));
        let processor = FileProcessor::from_config(&config, Arc::clone(&pool));
        debug!("Connection pool ready with {} backends", pool.len());

        Ok(Self {
            config,
            pool,
            processor,
            progress: LoadProgress::new(),
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Shared view of how many files this pipeline has finished.
    pub fn progress(&self) -> LoadProgress {
        self.progress.clone()
    }

    /// Load every file matching the configured pattern.
    ///
    /// Only an invalid pattern fails the run here; per-file problems are
    /// reported in the returned [`RunSummary`].
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let pattern = &self.config.source.pattern;
        let files = discover_files(pattern).context(DiscoverySnafu)?;
        info!("Found {} files matching {}", files.len(), pattern);
        self.progress.start(files.len());
        if self.config.dry_run {
            info!("Dry run: records will be logged, not written");
        }

        let summary = self.process_files(files).await;
        info!("Pipeline completed: {:?}", summary);
        Ok(summary)
    }

    /// Run `files` through the processor with bounded concurrency.
    async fn process_files(&self, files: Vec<PathBuf>) -> RunSummary {
        let max_concurrent = self.config.source.max_concurrent_files.max(1);
        let mut pending = files.into_iter();
        let mut in_flight: FuturesUnordered<FileTask> = FuturesUnordered::new();
        let mut summary = RunSummary::default();

        loop {
            while in_flight.len() < max_concurrent {
                let Some(path) = pending.next() else {
                    break;
                };
                in_flight.push(self.spawn_file(path));
                emit!(ActiveFiles {
                    count: in_flight.len()
                });
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            emit!(ActiveFiles {
                count: in_flight.len()
            });
            self.progress.file_done();

            match result {
                Ok(outcome) => {
                    debug!(
                        "[-] Finished file (in flight: {}): {}",
                        in_flight.len(),
                        outcome.path().display()
                    );
                    summary.record(&outcome);
                }
                Err(e) => {
                    handle_lost_task(e);
                    summary.record_lost_task();
                }
            }
        }

        summary
    }

    fn spawn_file(&self, path: PathBuf) -> FileTask {
        let processor = self.processor.clone();
        tokio::spawn(async move { processor.process(&path).await })
    }
}

fn handle_lost_task(e: JoinError) {
    error!("File task failed: {}", e);
    emit!(FileProcessed {
        status: FileStatus::Aborted
    });
}

/// Run the pipeline with the given configuration.
pub async fn run_pipeline(config: Config) -> Result<RunSummary, PipelineError> {
    let pipeline = Pipeline::new(config)?;
    pipeline.run().await
}
