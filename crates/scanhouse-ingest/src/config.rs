//! Configuration management
//!
//! Store connection parameters and runtime policies come from the process
//! environment, after loading an optional `.env` file. Command-line flags
//! never carry connection data.

use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::MalformedLinePolicy;
use crate::writer::WritePolicy;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_CLICKHOUSE_HOST: &str = "localhost";

pub const DEFAULT_CLICKHOUSE_PORT: u16 = 8123;

pub const DEFAULT_CLICKHOUSE_USER: &str = "default";

pub const DEFAULT_CLICKHOUSE_DB: &str = "default";

pub const DEFAULT_SCAN_TABLE: &str = "scans.scan_results";

pub const DEFAULT_PRODUCTS_TABLE: &str = "scans.products";

/// Attempts per insert when the retry policy is selected.
pub const DEFAULT_WRITE_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_WRITE_BACKOFF_MS: u64 = 500;

/// Lines between two progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Complete loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub ingest: IngestSettings,
}

/// Connection descriptor consumed by the store sink
#[derive(Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub scan_table: String,
    pub products_table: String,
    /// Ask the server to acknowledge inserts before they are committed
    pub async_insert: bool,
}

/// Runtime policies of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub write_policy: WritePolicy,
    pub on_malformed_line: MalformedLinePolicy,
    pub progress_interval: u64,
}

impl StoreConfig {
    /// HTTP endpoint of the server
    pub fn url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("scan_table", &self.scan_table)
            .field("products_table", &self.products_table)
            .field("async_insert", &self.async_insert)
            .finish()
    }
}

impl Config {
    /// Load configuration from `.env` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = StoreConfig {
            host: lookup("CLICKHOUSE_HOST").unwrap_or_else(|| DEFAULT_CLICKHOUSE_HOST.to_string()),
            port: parse_var(&lookup, "CLICKHOUSE_PORT", DEFAULT_CLICKHOUSE_PORT)?,
            user: lookup("CLICKHOUSE_USER").unwrap_or_else(|| DEFAULT_CLICKHOUSE_USER.to_string()),
            password: lookup("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            database: lookup("CLICKHOUSE_DB").unwrap_or_else(|| DEFAULT_CLICKHOUSE_DB.to_string()),
            scan_table: lookup("CLICKHOUSE_SCAN_TABLE")
                .unwrap_or_else(|| DEFAULT_SCAN_TABLE.to_string()),
            products_table: lookup("CLICKHOUSE_PRODUCTS_TABLE")
                .unwrap_or_else(|| DEFAULT_PRODUCTS_TABLE.to_string()),
            async_insert: parse_var(&lookup, "CLICKHOUSE_ASYNC_INSERT", true)?,
        };

        let write_policy = match lookup("INGEST_WRITE_POLICY").as_deref() {
            None | Some("best_effort") => WritePolicy::BestEffort,
            Some("fail_fast") => WritePolicy::FailFast,
            Some("retry") => WritePolicy::Retry {
                max_attempts: parse_var(&lookup, "INGEST_WRITE_MAX_ATTEMPTS", DEFAULT_WRITE_MAX_ATTEMPTS)?,
                initial_backoff: Duration::from_millis(parse_var(
                    &lookup,
                    "INGEST_WRITE_BACKOFF_MS",
                    DEFAULT_WRITE_BACKOFF_MS,
                )?),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "INGEST_WRITE_POLICY",
                    value: other.to_string(),
                    reason: "expected best_effort, fail_fast or retry".to_string(),
                })
            },
        };

        let on_malformed_line = match lookup("INGEST_ON_MALFORMED_LINE").as_deref() {
            None | Some("abort") => MalformedLinePolicy::Abort,
            Some("skip") => MalformedLinePolicy::Skip,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "INGEST_ON_MALFORMED_LINE",
                    value: other.to_string(),
                    reason: "expected abort or skip".to_string(),
                })
            },
        };

        let config = Config {
            store,
            ingest: IngestSettings {
                write_policy,
                on_malformed_line,
                progress_interval: parse_var(
                    &lookup,
                    "INGEST_PROGRESS_INTERVAL",
                    DEFAULT_PROGRESS_INTERVAL,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.host.trim().is_empty() {
            return Err(ConfigError::Invalid("CLICKHOUSE_HOST cannot be empty".to_string()));
        }

        if self.store.port == 0 {
            return Err(ConfigError::Invalid("CLICKHOUSE_PORT must be greater than 0".to_string()));
        }

        if self.store.scan_table.is_empty() || self.store.products_table.is_empty() {
            return Err(ConfigError::Invalid("table names cannot be empty".to_string()));
        }

        if let WritePolicy::Retry { max_attempts: 0, .. } = self.ingest.write_policy {
            return Err(ConfigError::Invalid(
                "INGEST_WRITE_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if self.ingest.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "INGEST_PROGRESS_INTERVAL must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                host: DEFAULT_CLICKHOUSE_HOST.to_string(),
                port: DEFAULT_CLICKHOUSE_PORT,
                user: DEFAULT_CLICKHOUSE_USER.to_string(),
                password: String::new(),
                database: DEFAULT_CLICKHOUSE_DB.to_string(),
                scan_table: DEFAULT_SCAN_TABLE.to_string(),
                products_table: DEFAULT_PRODUCTS_TABLE.to_string(),
                async_insert: true,
            },
            ingest: IngestSettings::default(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            write_policy: WritePolicy::BestEffort,
            on_malformed_line: MalformedLinePolicy::Abort,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
