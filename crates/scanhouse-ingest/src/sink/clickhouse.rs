//! ClickHouse sink
//!
//! Inserts go through the HTTP interface using RowBinary. Each call to
//! [`ScanSink::insert_scans`] or [`ScanSink::insert_products`] is a single
//! `INSERT` request.

use ::clickhouse::{Client, Row};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{ScanSink, SinkError};
use crate::config::StoreConfig;
use crate::models::{ProductEntry, ScanRecord};

/// Wire shape of a `scan_results` row
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct ScanResultRow {
    pub scan_id: String,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub tls_enabled: bool,
    pub used_probes: Vec<(String, String)>,
    pub scan_tries: u32,
    pub sent_probes: u32,
    pub banners: Vec<(String, String)>,
    pub timestamp: i64,
    pub total_time_spent: String,
    pub hex_banners: Vec<(String, String)>,
    pub banner_hashes: Vec<(String, String)>,
    pub product_count: u32,
    pub product_services: Vec<String>,
}

/// Wire shape of a `products` row
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct ProductRow {
    pub scan_id: String,
    pub probe: String,
    pub service: String,
    pub regex: String,
    pub softmatch: u8,
    pub vendor_product_name: Option<String>,
    pub info: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub hostname: Option<String>,
    pub cpe: Vec<String>,
}

fn map_column(mapping: &crate::models::Mapping) -> Vec<(String, String)> {
    mapping.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

impl From<&ScanRecord> for ScanResultRow {
    fn from(record: &ScanRecord) -> Self {
        Self {
            scan_id: record.scan_id.clone(),
            ip: record.ip.clone(),
            port: record.port,
            protocol: record.protocol.clone(),
            tls_enabled: record.tls_enabled,
            used_probes: map_column(&record.used_probes),
            scan_tries: record.scan_tries,
            sent_probes: record.sent_probes,
            banners: map_column(&record.banners),
            timestamp: record.timestamp,
            total_time_spent: record.total_time_spent.clone(),
            hex_banners: map_column(&record.hex_banners),
            banner_hashes: map_column(&record.banner_hashes),
            product_count: record.product_count,
            product_services: record.product_services.iter().cloned().collect(),
        }
    }
}

impl From<&ProductEntry> for ProductRow {
    fn from(entry: &ProductEntry) -> Self {
        Self {
            scan_id: entry.scan_id.clone(),
            probe: entry.probe.clone(),
            service: entry.service.clone(),
            regex: entry.regex.clone(),
            softmatch: entry.softmatch,
            vendor_product_name: entry.vendor_product_name.clone(),
            info: entry.info.clone(),
            os: entry.os.clone(),
            device_type: entry.device_type.clone(),
            hostname: entry.hostname.clone(),
            cpe: entry.cpe.clone(),
        }
    }
}

/// Sink writing to a ClickHouse server
#[derive(Clone)]
pub struct ClickHouseSink {
    client: Client,
    scan_table: String,
    products_table: String,
}

impl ClickHouseSink {
    /// Build a client without contacting the server
    pub fn new(config: &StoreConfig) -> Self {
        let mut client = Client::default()
            .with_url(config.url())
            .with_user(&config.user)
            .with_password(&config.password)
            .with_database(&config.database);

        if config.async_insert {
            client = client
                .with_option("async_insert", "1")
                .with_option("wait_for_async_insert", "0");
        }

        Self {
            client,
            scan_table: config.scan_table.clone(),
            products_table: config.products_table.clone(),
        }
    }

    /// Build a client and check that the server answers
    pub async fn connect(config: &StoreConfig) -> Result<Self, SinkError> {
        let sink = Self::new(config);

        debug!(url = %config.url(), database = %config.database, "Connecting to ClickHouse");
        sink.client.query("SELECT 1").execute().await?;
        info!(url = %config.url(), database = %config.database, "Connected to ClickHouse");

        Ok(sink)
    }

    async fn insert_all<T>(&self, table: &str, rows: impl Iterator<Item = T>) -> Result<(), SinkError>
    where
        T: Row + Serialize,
    {
        let mut insert = self.client.insert(table)?;
        for row in rows {
            insert.write(&row).await?;
        }
        insert.end().await?;
        Ok(())
    }
}

#[async_trait]
impl ScanSink for ClickHouseSink {
    fn scan_table(&self) -> &str {
        &self.scan_table
    }

    fn products_table(&self) -> &str {
        &self.products_table
    }

    async fn insert_scans(&self, rows: &[ScanRecord]) -> Result<(), SinkError> {
        self.insert_all(&self.scan_table, rows.iter().map(ScanResultRow::from))
            .await
    }

    async fn insert_products(&self, rows: &[ProductEntry]) -> Result<(), SinkError> {
        self.insert_all(&self.products_table, rows.iter().map(ProductRow::from))
            .await
    }
}
