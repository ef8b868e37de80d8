//! shortsync Ingest Library
//!
//! Publishes new files from a Dropbox folder to YouTube, exactly once each,
//! in a deterministic order, on a recurring schedule.
//!
//! # Components
//!
//! - **Source** ([`source`]): lists the remote folder and streams file content
//! - **Ledger** ([`ledger`]): durable set of names already published
//! - **Staging** ([`staging`]): local scratch space for the file in flight
//! - **Sink** ([`sink`]): uploads a staged file with its metadata
//! - **Pipeline** ([`pipeline`]): one sweep of list, filter, order, publish
//! - **Scheduler** ([`scheduler`]): repeats sweeps with back-off and bounds
//!
//! # Example
//!
//! ```no_run
//! use shortsync_ingest::config::{load_env_file, IngestConfig};
//! use shortsync_ingest::setup::build_pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     load_env_file(None)?;
//!     let config = IngestConfig::from_env()?;
//!     let mut pipeline = build_pipeline(&config)?;
//!     let outcome = pipeline.run_once().await?;
//!     println!("published {}", outcome.report().published.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod setup;
pub mod sink;
pub mod source;
pub mod staging;

pub use error::{IngestError, Result};
pub use pipeline::{IngestionPipeline, PipelineSettings};
pub use scheduler::{PollPolicy, RunSummary, StopReason};
