//! Shared helpers for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use scanhouse_ingest::{ProductEntry, ScanRecord, ScanSink, SinkError};
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// One insert request seen by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum Insert {
    Scans(Vec<ScanRecord>),
    Products(Vec<ProductEntry>),
}

/// In-memory sink recording every insert call in order
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Insert>>,
    /// 1-based scan insert calls that fail
    failing_scan_calls: Vec<usize>,
    fail_all: bool,
    scan_calls: Mutex<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails
    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    /// The listed scan insert calls fail, the rest succeed
    pub fn failing_scan_calls(calls: &[usize]) -> Self {
        Self {
            failing_scan_calls: calls.to_vec(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Insert> {
        self.calls.lock().unwrap().clone()
    }

    /// Sizes of recorded scan inserts, failed ones included
    pub fn scan_batch_sizes(&self) -> Vec<usize> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                Insert::Scans(rows) => Some(rows.len()),
                Insert::Products(_) => None,
            })
            .collect()
    }

    pub fn scans(&self) -> Vec<ScanRecord> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Insert::Scans(rows) => Some(rows),
                Insert::Products(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn products(&self) -> Vec<ProductEntry> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Insert::Products(rows) => Some(rows),
                Insert::Scans(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn product_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Insert::Products(_)))
            .count()
    }
}

#[async_trait]
impl ScanSink for RecordingSink {
    fn scan_table(&self) -> &str {
        "scans.scan_results"
    }

    fn products_table(&self) -> &str {
        "scans.products"
    }

    async fn insert_scans(&self, rows: &[ScanRecord]) -> Result<(), SinkError> {
        let call = {
            let mut count = self.scan_calls.lock().unwrap();
            *count += 1;
            *count
        };
        self.calls.lock().unwrap().push(Insert::Scans(rows.to_vec()));

        if self.fail_all || self.failing_scan_calls.contains(&call) {
            return Err(SinkError::Rejected(format!("scan insert {} refused", call)));
        }
        Ok(())
    }

    async fn insert_products(&self, rows: &[ProductEntry]) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(Insert::Products(rows.to_vec()));

        if self.fail_all {
            return Err(SinkError::Rejected("product insert refused".to_string()));
        }
        Ok(())
    }
}

/// Write `lines` to a temporary NDJSON file
pub fn ndjson_file<I, S>(lines: I) -> NamedTempFile
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line.as_ref()).unwrap();
    }
    file.flush().unwrap();
    file
}

/// A valid scan line with a unique port
pub fn scan_line(i: usize) -> String {
    format!(
        r#"{{"ip":"10.0.{}.{}","port":{},"timestamp":1700000000,"protocol":"tcp","products":[{{"service":"http"}}]}}"#,
        (i / 256) % 256,
        i % 256,
        i % 65_536
    )
}
