//! Sink writer
//!
//! Sends drained batches to the store and applies the configured
//! [`WritePolicy`] when an insert fails. Scan rows are always inserted
//! before the product rows of the same batch.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::batch::DrainedBatch;
use crate::error::IngestError;
use crate::sink::{ScanSink, SinkError};

/// What to do when a batch insert fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Log the failure, drop the rows and keep going
    #[default]
    BestEffort,
    /// Stop the run on the first failure
    FailFast,
    /// Retry with doubling backoff, then drop the rows
    Retry {
        max_attempts: u32,
        initial_backoff: Duration,
    },
}

/// Result of writing one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing was buffered, no request was made
    Empty,
    /// All rows were accepted
    Written { scans: usize, products: usize },
    /// An insert failed and the rows were discarded
    Dropped { scans: usize, products: usize },
}

/// Writes batches through a [`ScanSink`]
pub struct SinkWriter<S> {
    sink: S,
    policy: WritePolicy,
}

impl<S: ScanSink> SinkWriter<S> {
    pub fn new(sink: S, policy: WritePolicy) -> Self {
        Self { sink, policy }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Insert scan rows, then product rows.
    ///
    /// When the scan insert fails the product insert is skipped so products
    /// never land without their scan rows. Errors only surface under
    /// [`WritePolicy::FailFast`].
    pub async fn write(&self, batch: DrainedBatch) -> Result<WriteOutcome, IngestError> {
        let scans = batch.scans.len();
        let products = batch.products.len();

        if scans == 0 && products == 0 {
            return Ok(WriteOutcome::Empty);
        }

        if scans > 0 {
            let (sink, rows) = (&self.sink, &batch.scans);
            let table = sink.scan_table();
            let attempt = self
                .insert_with_policy(table, scans, move || sink.insert_scans(rows))
                .await;
            if !self.accept(attempt, table, scans)? {
                return Ok(WriteOutcome::Dropped { scans, products });
            }
        }

        if products > 0 {
            let (sink, rows) = (&self.sink, &batch.products);
            let table = sink.products_table();
            let attempt = self
                .insert_with_policy(table, products, move || sink.insert_products(rows))
                .await;
            if !self.accept(attempt, table, products)? {
                return Ok(WriteOutcome::Dropped { scans, products });
            }
        }

        debug!(scans, products, "Batch written");
        Ok(WriteOutcome::Written { scans, products })
    }

    /// Run one insert, retrying when the policy asks for it
    async fn insert_with_policy<F, Fut>(
        &self,
        table: &str,
        rows: usize,
        mut insert: F,
    ) -> Result<(), SinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SinkError>>,
    {
        let (max_attempts, mut backoff) = match self.policy {
            WritePolicy::Retry {
                max_attempts,
                initial_backoff,
            } => (max_attempts.max(1), initial_backoff),
            _ => (1, Duration::ZERO),
        };

        let mut attempt = 1;
        loop {
            match insert().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        table,
                        rows,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Insert failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// `Ok(true)` when the insert succeeded, `Ok(false)` when its rows are dropped
    fn accept(
        &self,
        attempt: Result<(), SinkError>,
        table: &str,
        rows: usize,
    ) -> Result<bool, IngestError> {
        let Err(source) = attempt else {
            return Ok(true);
        };

        error!(table, rows, error = %error_chain(&source), "Batch insert failed");

        match self.policy {
            WritePolicy::FailFast => Err(IngestError::StoreWrite {
                table: table.to_string(),
                rows,
                source,
            }),
            WritePolicy::BestEffort | WritePolicy::Retry { .. } => Ok(false),
        }
    }
}

/// Render an error with all of its sources on one line
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
