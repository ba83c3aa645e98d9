//! Scanhouse Ingest - scanner NDJSON loader

use clap::Parser;
use scanhouse_common::logging::{init_logging, LogConfig};
use scanhouse_ingest::{
    cli::{exit_code, Cli},
    config::Config,
    pipeline::{Pipeline, PipelineOptions},
    signal::cancel_on_signal,
    ClickHouseSink,
};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Usage errors go to the terminal only, logging is not set up yet
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(exit_code(&e));
        },
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        },
    };

    let log_config = match LogConfig::from_env() {
        Ok(log_config) => log_config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {:#}", e);
            process::exit(1);
        },
    };

    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: cannot initialize logging: {:#}", e);
            process::exit(1);
        },
    };

    if let Err(e) = run(cli, config).await {
        error!(error = %format!("{:#}", e), "Ingestion failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let options = PipelineOptions::from_settings(cli.mode(), cli.batch_size, &config.ingest);
    info!(
        file = %cli.file_path.display(),
        mode = %options.mode,
        batch_size = options.batch_size,
        store = ?config.store,
        "Starting ingestion"
    );

    let shutdown = CancellationToken::new();
    let watcher = cancel_on_signal(shutdown.clone());

    let mut pipeline = Pipeline::new(options)?.with_shutdown(shutdown.clone());
    let result = pipeline
        .run_file(ClickHouseSink::connect(&config.store), &cli.file_path)
        .await;

    shutdown.cancel();
    let _ = watcher.await;

    result?;
    Ok(())
}
