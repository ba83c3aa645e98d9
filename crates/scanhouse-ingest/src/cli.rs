//! Command-line interface

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::models::ScanMode;

/// Load scanner NDJSON output into ClickHouse
///
/// Connection settings are read from the environment (CLICKHOUSE_HOST,
/// CLICKHOUSE_PORT, CLICKHOUSE_USER, CLICKHOUSE_PASSWORD, CLICKHOUSE_DB) or
/// from a `.env` file in the working directory.
#[derive(Parser, Debug)]
#[command(name = "scanhouse-ingest")]
#[command(author, version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// NDJSON file produced by the scanner
    #[arg(value_name = "FILE_PATH")]
    pub file_path: PathBuf,

    /// Insert product rows alongside scan rows (default)
    #[arg(long, overrides_with = "short")]
    pub extended: bool,

    /// Insert scan rows only
    #[arg(long, overrides_with = "extended")]
    pub short: bool,

    /// Scan rows per insert
    #[arg(
        long = "batch_size",
        value_name = "N",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,
}

impl Cli {
    /// The last of `--extended` / `--short` wins
    pub fn mode(&self) -> ScanMode {
        if self.short {
            ScanMode::Short
        } else {
            ScanMode::Extended
        }
    }
}

fn parse_batch_size(raw: &str) -> Result<usize, String> {
    let size: usize = raw
        .parse()
        .map_err(|_| format!("'{}' is not a positive integer", raw))?;
    if size == 0 {
        return Err("batch size must be greater than 0".to_string());
    }
    Ok(size)
}

/// Process exit code for an argument error: 0 for help and version output
pub fn exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}
