//! Pipeline driver
//!
//! Streams an NDJSON file line by line through decode, normalize, accumulate
//! and write. Everything runs on the calling task: at most one read or one
//! insert is outstanding and batches reach the store in input order.
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Draining -> Finished
//! ```

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::batch::{Batch, DEFAULT_BATCH_SIZE};
use crate::config::{IngestSettings, DEFAULT_PROGRESS_INTERVAL};
use crate::decoder::decode_line;
use crate::error::{ConfigError, IngestError, Result};
use crate::models::ScanMode;
use crate::normalizer::normalize_products;
use crate::sink::{ScanSink, SinkError};
use crate::writer::{error_chain, SinkWriter, WriteOutcome, WritePolicy};

/// What to do with a line that does not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
    /// Fail the run with the offending line number
    #[default]
    Abort,
    /// Log a warning and continue with the next line
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Finished,
}

/// Per-run options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub mode: ScanMode,
    /// Scan rows per insert
    pub batch_size: usize,
    /// Lines between progress log lines
    pub progress_interval: u64,
    pub on_malformed_line: MalformedLinePolicy,
    pub write_policy: WritePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            on_malformed_line: MalformedLinePolicy::default(),
            write_policy: WritePolicy::default(),
        }
    }
}

impl PipelineOptions {
    /// Combine command-line choices with environment settings
    pub fn from_settings(mode: ScanMode, batch_size: usize, settings: &IngestSettings) -> Self {
        Self {
            mode,
            batch_size,
            progress_interval: settings.progress_interval,
            on_malformed_line: settings.on_malformed_line,
            write_policy: settings.write_policy,
        }
    }
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Lines read, including blank and skipped ones
    pub lines_processed: u64,
    pub records_decoded: u64,
    pub product_rows: u64,
    pub malformed_skipped: u64,
    pub batches_written: u64,
    pub batches_dropped: u64,
    /// Reading stopped early because shutdown was requested
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Drives one ingestion run
pub struct Pipeline {
    options: PipelineOptions,
    shutdown: CancellationToken,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> std::result::Result<Self, ConfigError> {
        if options.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if options.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "progress interval must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            options,
            shutdown: CancellationToken::new(),
            state: PipelineState::Idle,
        })
    }

    /// Stop reading at the next line boundary once `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Connect to the store, open `path` and ingest it
    #[instrument(
        name = "ingest",
        skip_all,
        fields(path = %path.display(), mode = %self.options.mode)
    )]
    pub async fn run_file<S, C>(&mut self, connect: C, path: &Path) -> Result<PipelineStats>
    where
        S: ScanSink,
        C: Future<Output = std::result::Result<S, SinkError>>,
    {
        self.transition(PipelineState::Connecting);

        let sink = connect.await.map_err(IngestError::StoreConnect)?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| IngestError::Input {
                path: path.to_path_buf(),
                source,
            })?;

        self.run_reader(sink, BufReader::new(file)).await
    }

    /// Ingest every line of `reader` into `sink`
    pub async fn run_reader<S, R>(&mut self, sink: S, reader: R) -> Result<PipelineStats>
    where
        S: ScanSink,
        R: AsyncBufRead + Unpin,
    {
        let started = Instant::now();
        let writer = SinkWriter::new(sink, self.options.write_policy);
        let mut batch = Batch::new(self.options.batch_size)?;
        let mut stats = PipelineStats::default();
        let mut lines = reader.lines();
        let mut interval_started = started;

        self.transition(PipelineState::Streaming);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(lines = stats.lines_processed, "Shutdown requested, stopping after current line");
                    stats.cancelled = true;
                    break;
                }
                next = lines.next_line() => next,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(source) => {
                    return Err(IngestError::Read {
                        line: stats.lines_processed,
                        source,
                    })
                },
            };

            stats.lines_processed += 1;
            self.process_line(&line, stats.lines_processed, &mut batch, &mut stats)?;

            if batch.is_ready() {
                flush(&writer, &mut batch, &mut stats).await?;
            }

            if stats.lines_processed % self.options.progress_interval == 0 {
                let now = Instant::now();
                info!(
                    lines = stats.lines_processed,
                    interval_secs = now.duration_since(interval_started).as_secs_f64(),
                    total_secs = now.duration_since(started).as_secs_f64(),
                    "Processed lines"
                );
                interval_started = now;
            }
        }

        self.transition(PipelineState::Draining);
        if !batch.is_empty() {
            flush(&writer, &mut batch, &mut stats).await?;
        }

        stats.elapsed = started.elapsed();
        self.transition(PipelineState::Finished);

        info!(
            lines = stats.lines_processed,
            records = stats.records_decoded,
            product_rows = stats.product_rows,
            malformed_skipped = stats.malformed_skipped,
            batches_written = stats.batches_written,
            batches_dropped = stats.batches_dropped,
            cancelled = stats.cancelled,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "Ingestion finished"
        );

        Ok(stats)
    }

    fn process_line(
        &self,
        line: &str,
        line_no: u64,
        batch: &mut Batch,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let decoded = match decode_line(line) {
            Ok(decoded) => decoded,
            Err(source) => match self.options.on_malformed_line {
                MalformedLinePolicy::Abort => {
                    return Err(IngestError::Decode {
                        line: line_no,
                        source,
                    })
                },
                MalformedLinePolicy::Skip => {
                    warn!(line = line_no, error = %error_chain(&source), "Skipping malformed line");
                    stats.malformed_skipped += 1;
                    return Ok(());
                },
            },
        };

        let products = if self.options.mode.includes_products() {
            normalize_products(&decoded.record.scan_id, &decoded.products)
        } else {
            Vec::new()
        };

        stats.records_decoded += 1;
        stats.product_rows += products.len() as u64;
        batch.append(decoded.record, products);
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state changed");
        self.state = next;
    }
}

async fn flush<S: ScanSink>(
    writer: &SinkWriter<S>,
    batch: &mut Batch,
    stats: &mut PipelineStats,
) -> Result<()> {
    match writer.write(batch.drain_and_clear()).await? {
        WriteOutcome::Written { .. } => stats.batches_written += 1,
        WriteOutcome::Dropped { .. } => stats.batches_dropped += 1,
        WriteOutcome::Empty => {},
    }
    Ok(())
}
