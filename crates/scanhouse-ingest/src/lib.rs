//! Scanhouse Ingest Library
//!
//! Streams newline-delimited JSON produced by a network scanner into two
//! ClickHouse tables: one row per scanned ip/port/timestamp in
//! `scan_results`, one row per detected service fingerprint in `products`.
//!
//! # Components
//!
//! - **decoder**: one line into a [`ScanRecord`] plus raw product entries
//! - **normalizer**: raw product entries into [`ProductEntry`] rows
//! - **batch**: row buffer with a size-triggered flush
//! - **writer**: batch inserts through a [`ScanSink`] under a [`WritePolicy`]
//! - **pipeline**: the driver tying the above together
//!
//! # Example
//!
//! ```no_run
//! use scanhouse_ingest::{ClickHouseSink, Config, Pipeline, PipelineOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let mut pipeline = Pipeline::new(PipelineOptions::default())?;
//!     let stats = pipeline
//!         .run_file(ClickHouseSink::connect(&config.store), Path::new("scan.json"))
//!         .await?;
//!     println!("{} lines", stats.lines_processed);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod decoder;
mod document;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod signal;
pub mod sink;
pub mod writer;

pub use batch::{Batch, DrainedBatch, DEFAULT_BATCH_SIZE};
pub use config::{Config, IngestSettings, StoreConfig};
pub use decoder::{decode_line, DecodedLine};
pub use error::{ConfigError, DecodeError, IngestError, Result};
pub use models::{ProductEntry, ScanMode, ScanRecord};
pub use normalizer::normalize_products;
pub use pipeline::{MalformedLinePolicy, Pipeline, PipelineOptions, PipelineState, PipelineStats};
pub use sink::{ClickHouseSink, ScanSink, SinkError};
pub use writer::{SinkWriter, WriteOutcome, WritePolicy};
