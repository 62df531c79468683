//! memc-load: load gzip-compressed app-install logs into memcached.
//!
//! Each input line `devtype\tdevid\tlat\tlon\tapp1,app2,...` becomes one
//! protobuf-encoded `UserApps` value stored under `devtype:devid` on the
//! memcached server configured for its device type. Files are processed
//! concurrently, gated on their error rate, and renamed with a leading dot
//! once consumed.
//!
//! # Example
//!
//! ```ignore
//! use memc_load::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::default();
//!     let summary = run_pipeline(config).await?;
//!     println!("Delivered {} records", summary.records_processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, RunSummary, run_pipeline};
