//! Prometheus metrics endpoint for memc-load.
//!
//! Serves the recorder over HTTP while a load runs, together with a
//! `/health` endpoint that reports how far the run has got.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tracing::error;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// File counts of the current run, shared between the pipeline and `/health`.
#[derive(Debug, Clone, Default)]
pub struct LoadProgress {
    inner: Arc<ProgressCounters>,
}

#[derive(Debug, Default)]
struct ProgressCounters {
    files_total: AtomicUsize,
    files_done: AtomicUsize,
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run over `files` inputs.
    pub fn start(&self, files: usize) {
        self.inner.files_total.store(files, Ordering::Relaxed);
        self.inner.files_done.store(0, Ordering::Relaxed);
    }

    pub fn file_done(&self) {
        self.inner.files_done.fetch_add(1, Ordering::Relaxed);
    }

    /// `(done, total)` files.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.inner.files_done.load(Ordering::Relaxed),
            self.inner.files_total.load(Ordering::Relaxed),
        )
    }
}

/// Install the Prometheus recorder and serve it on `addr`.
///
/// The HTTP server exposes:
/// - `/metrics` - Prometheus metrics in text format
/// - `/health` - `ok` plus the number of files finished so far
///
/// Must be called from within a tokio runtime; the server runs as a
/// background task for the rest of the process.
///
/// ```ignore
/// use memc_load::metrics::{self, LoadProgress};
///
/// let addr = "0.0.0.0:9090".parse().unwrap();
/// metrics::init(addr, LoadProgress::new()).expect("Failed to initialize metrics");
/// ```
pub fn init(addr: SocketAddr, progress: LoadProgress) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(run_server(addr, router(handle, progress)));

    Ok(())
}

fn router(handle: PrometheusHandle, progress: LoadProgress) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle))
        .layer(Extension(progress))
}

/// Bind `addr` and serve until the process exits. Bind errors are logged, not fatal.
async fn run_server(addr: SocketAddr, app: Router) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

/// Handler for `/health`: `ok <done>/<total> files`.
async fn health_handler(Extension(progress): Extension<LoadProgress>) -> String {
    health_line(&progress)
}

fn health_line(progress: &LoadProgress) -> String {
    let (done, total) = progress.snapshot();
    format!("ok {done}/{total} files\n")
}
