//! Batch accumulation
//!
//! Buffers scan and product rows between flushes. The accumulator does no
//! I/O and never flushes on its own: the pipeline polls [`Batch::is_ready`]
//! and calls [`Batch::drain_and_clear`] before handing rows to the writer.

use crate::error::ConfigError;
use crate::models::{ProductEntry, ScanRecord};

/// Default number of scan rows per insert
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Rows accumulated since the last flush
#[derive(Debug)]
pub struct Batch {
    threshold: usize,
    scans: Vec<ScanRecord>,
    products: Vec<ProductEntry>,
}

/// Contents taken out of a batch by [`Batch::drain_and_clear`]
#[derive(Debug, Default, PartialEq)]
pub struct DrainedBatch {
    pub scans: Vec<ScanRecord>,
    pub products: Vec<ProductEntry>,
}

impl Batch {
    /// Create an empty batch that becomes ready at `threshold` scan rows
    pub fn new(threshold: usize) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            threshold,
            scans: Vec::new(),
            products: Vec::new(),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Add one scan row and its product rows
    pub fn append(&mut self, scan: ScanRecord, products: Vec<ProductEntry>) {
        self.scans.push(scan);
        self.products.extend(products);
    }

    /// Number of buffered scan rows. Product rows do not count.
    pub fn size(&self) -> usize {
        self.scans.len()
    }

    pub fn product_rows(&self) -> usize {
        self.products.len()
    }

    pub fn is_ready(&self) -> bool {
        self.size() >= self.threshold
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty() && self.products.is_empty()
    }

    /// Take the buffered rows, leaving both buffers empty
    pub fn drain_and_clear(&mut self) -> DrainedBatch {
        DrainedBatch {
            scans: std::mem::take(&mut self.scans),
            products: std::mem::take(&mut self.products),
        }
    }
}
