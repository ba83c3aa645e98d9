//! Scan data models
//!
//! Rows produced from scanner output. Field order matches the column order
//! of the `scan_results` and `products` tables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// String-to-string mapping column (`Map(String, String)` in the store)
pub type Mapping = BTreeMap<String, String>;

/// One scanned ip/port/timestamp combination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Join key to products: `{ip}_{port}_{timestamp}`
    pub scan_id: String,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub tls_enabled: bool,
    pub used_probes: Mapping,
    pub scan_tries: u32,
    pub sent_probes: u32,
    pub banners: Mapping,
    /// Epoch seconds
    pub timestamp: i64,
    pub total_time_spent: String,
    pub hex_banners: Mapping,
    pub banner_hashes: Mapping,
    /// Number of raw product entries on the line, not distinct services
    pub product_count: u32,
    /// Distinct non-empty services across the line's products
    pub product_services: BTreeSet<String>,
}

impl ScanRecord {
    /// Build the scan identifier shared by a record and its products
    pub fn make_scan_id(
        ip: impl std::fmt::Display,
        port: impl std::fmt::Display,
        timestamp: impl std::fmt::Display,
    ) -> String {
        format!("{}_{}_{}", ip, port, timestamp)
    }
}

/// One service fingerprint detected within a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub scan_id: String,
    pub probe: String,
    pub service: String,
    pub regex: String,
    /// 0 or 1
    pub softmatch: u8,
    pub vendor_product_name: Option<String>,
    pub info: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub hostname: Option<String>,
    pub cpe: Vec<String>,
}

/// Whether product rows are produced alongside scan rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Scan rows and product rows
    #[default]
    Extended,
    /// Scan rows only; product normalization is skipped
    Short,
}

impl ScanMode {
    pub fn includes_products(self) -> bool {
        matches!(self, ScanMode::Extended)
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Extended => write!(f, "extended"),
            ScanMode::Short => write!(f, "short"),
        }
    }
}
