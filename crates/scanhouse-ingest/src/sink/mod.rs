//! Store sink interface
//!
//! The pipeline only needs two bulk inserts from the store. [`ScanSink`] is
//! that seam: [`clickhouse::ClickHouseSink`] talks to a real server, tests
//! plug in in-memory sinks.

pub mod clickhouse;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ProductEntry, ScanRecord};

pub use self::clickhouse::ClickHouseSink;

/// Errors raised by a sink implementation
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] ::clickhouse::error::Error),

    #[error("insert rejected: {0}")]
    Rejected(String),
}

/// Bulk insert target for scan and product rows
#[async_trait]
pub trait ScanSink: Send + Sync {
    /// Table receiving scan rows, used in log messages
    fn scan_table(&self) -> &str;

    /// Table receiving product rows, used in log messages
    fn products_table(&self) -> &str;

    /// Insert all rows in one request
    async fn insert_scans(&self, rows: &[ScanRecord]) -> Result<(), SinkError>;

    /// Insert all rows in one request
    async fn insert_products(&self, rows: &[ProductEntry]) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: ScanSink + ?Sized> ScanSink for Arc<T> {
    fn scan_table(&self) -> &str {
        (**self).scan_table()
    }

    fn products_table(&self) -> &str {
        (**self).products_table()
    }

    async fn insert_scans(&self, rows: &[ScanRecord]) -> Result<(), SinkError> {
        (**self).insert_scans(rows).await
    }

    async fn insert_products(&self, rows: &[ProductEntry]) -> Result<(), SinkError> {
        (**self).insert_products(rows).await
    }
}
