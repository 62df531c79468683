//! Gzip line reader.
//!
//! Files are opened and decompressed on tokio's blocking thread pool and
//! their lines are handed to the async side in batches over a bounded
//! channel, so a slow backend applies backpressure to decompression.

use flate2::read::MultiGzDecoder;
use snafu::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{GzipDecompressionSnafu, OpenSnafu, ReaderError, ReaderJoinSnafu};

/// Batches buffered between the reader thread and the processor.
const CHANNEL_DEPTH: usize = 4;

/// Blocking reader over a gzip-compressed text file.
pub struct GzipLineReader {
    path: PathBuf,
    inner: BufReader<MultiGzDecoder<BufReader<File>>>,
}

impl GzipLineReader {
    /// Open `path` and validate the gzip stream.
    ///
    /// The first block is decompressed eagerly so that a missing or
    /// corrupt gzip header fails here rather than on the first line.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let display = path.display().to_string();
        let file = File::open(path).context(OpenSnafu { path: &display })?;
        let mut inner = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        inner
            .fill_buf()
            .context(GzipDecompressionSnafu { path: &display })?;
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Read the next line without its line terminator.
    ///
    /// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced
    /// rather than rejected; such lines fail parsing downstream.
    pub fn next_line(&mut self, buf: &mut Vec<u8>) -> Result<Option<String>, ReaderError> {
        buf.clear();
        let read = self
            .inner
            .read_until(b'\n', buf)
            .context(GzipDecompressionSnafu {
                path: self.path.display().to_string(),
            })?;
        if read == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(buf).into_owned()))
    }

    /// Stream every line into `tx`, `batch_size` lines at a time.
    ///
    /// A read error is sent as the final item. Stops early if the
    /// receiver is dropped.
    fn pump(mut self, tx: mpsc::Sender<Result<Vec<String>, ReaderError>>, batch_size: usize) {
        let mut buf = Vec::new();
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        loop {
            match self.next_line(&mut buf) {
                Ok(Some(line)) => {
                    batch.push(line);
                    total += 1;
                    if batch.len() >= batch_size {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                        if tx.blocking_send(Ok(full)).is_err() {
                            debug!("[read] Consumer closed for {}", self.path.display());
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if !batch.is_empty() {
                        let _ = tx.blocking_send(Ok(std::mem::take(&mut batch)));
                    }
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            }
        }

        if !batch.is_empty() {
            let _ = tx.blocking_send(Ok(batch));
        }
        debug!("[read] Read {} lines from {}", total, self.path.display());
    }
}

/// Async handle to a file being read on the blocking pool.
pub struct LineStream {
    rx: mpsc::Receiver<Result<Vec<String>, ReaderError>>,
}

impl LineStream {
    /// Open `path` on the blocking pool and start streaming its lines.
    pub async fn open(path: &Path, batch_size: usize) -> Result<Self, ReaderError> {
        let display = path.display().to_string();
        let owned = path.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || GzipLineReader::open(&owned))
            .await
            .context(ReaderJoinSnafu { path: display })??;

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::task::spawn_blocking(move || reader.pump(tx, batch_size.max(1)));

        Ok(Self { rx })
    }

    /// Next batch of lines in file order; `None` once the file is exhausted.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<String>, ReaderError>> {
        self.rx.recv().await
    }
}
