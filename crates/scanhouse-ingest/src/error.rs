//! Error types for scan ingestion

use std::path::PathBuf;
use thiserror::Error;

use crate::sink::SinkError;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// A line that could not be turned into a scan record
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON")]
    Syntax(#[from] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Invalid runtime configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Main error type for the ingest pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed input on line {line}")]
    Decode {
        line: u64,
        #[source]
        source: DecodeError,
    },

    #[error("cannot connect to the store")]
    StoreConnect(#[source] SinkError),

    #[error("insert of {rows} rows into {table} failed")]
    StoreWrite {
        table: String,
        rows: usize,
        #[source]
        source: SinkError,
    },

    #[error("cannot open input file {}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input after line {line}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

