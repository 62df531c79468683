//! memc-load: load gzip-compressed app-install logs into memcached.
//!
//! Reads every file matching a glob pattern, routes each record to the
//! memcached server of its device type, and renames consumed files with a
//! leading dot so they are skipped on the next run.

use clap::Parser;
use snafu::prelude::*;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use memc_load::Config;
use memc_load::error::{
    AddressParseSnafu, ConfigSnafu, LoadFailedSnafu, LogFileSnafu, MetricsSnafu, PipelineError,
};
use memc_load::{Pipeline, metrics};

/// Gzip app-install logs to memcached loader.
#[derive(Parser, Debug)]
#[command(name = "memc-load")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional YAML configuration file; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Glob pattern for input files [default: data/appsinstalled/*.tsv.gz].
    #[arg(long)]
    pattern: Option<String>,

    /// memcached address for idfa devices [default: 127.0.0.1:33013].
    #[arg(long)]
    idfa: Option<String>,

    /// memcached address for gaid devices [default: 127.0.0.1:33014].
    #[arg(long)]
    gaid: Option<String>,

    /// memcached address for adid devices [default: 127.0.0.1:33015].
    #[arg(long)]
    adid: Option<String>,

    /// memcached address for dvid devices [default: 127.0.0.1:33016].
    #[arg(long)]
    dvid: Option<String>,

    /// Log intended writes instead of sending them.
    #[arg(long)]
    dry: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of files processed concurrently [default: 4].
    #[arg(long)]
    workers: Option<usize>,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090).
    #[arg(long)]
    metrics_address: Option<String>,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    init_logging(&args)?;
    info!("memc-load starting");

    let config = build_config(&args)?;
    let metrics_config = config.metrics.clone();
    let pipeline = Pipeline::new(config)?;

    if metrics_config.enabled {
        let addr = metrics_config.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr, pipeline.progress()).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            metrics_config.address
        );
    }

    let summary = pipeline.run().await?;

    info!("Load finished");
    info!("  Files: {}", summary.files_total);
    info!("  Acceptable: {}", summary.acceptable);
    info!("  High error rate: {}", summary.high_error_rate);
    info!("  Not evaluated: {}", summary.not_evaluated);
    info!("  Aborted: {}", summary.aborted);
    info!("  Records delivered: {}", summary.records_processed);
    info!("  Records failed: {}", summary.records_failed);

    ensure!(
        summary.is_success(),
        LoadFailedSnafu {
            failed: summary.failed,
            aborted: summary.aborted
        }
    );
    Ok(())
}

/// Install the tracing subscriber, writing to `--log` when given.
fn init_logging(args: &Args) -> Result<(), PipelineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match &args.log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(LogFileSnafu {
                    path: path.display().to_string(),
                })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

/// Load the YAML file (if any) and apply command-line overrides.
fn build_config(args: &Args) -> Result<Config, PipelineError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu)?,
        None => Config::default(),
    };

    if let Some(pattern) = &args.pattern {
        config.source.pattern = pattern.clone();
    }
    for (dev_type, addr) in [
        ("idfa", &args.idfa),
        ("gaid", &args.gaid),
        ("adid", &args.adid),
        ("dvid", &args.dvid),
    ] {
        if let Some(addr) = addr {
            config.backends.insert(dev_type.to_string(), addr.clone());
        }
    }
    if args.dry {
        config.dry_run = true;
    }
    if let Some(workers) = args.workers {
        config.source.max_concurrent_files = workers;
    }
    if let Some(address) = &args.metrics_address {
        config.metrics.enabled = true;
        config.metrics.address = address.clone();
    }

    config.validate().context(ConfigSnafu)?;
    Ok(config)
}
