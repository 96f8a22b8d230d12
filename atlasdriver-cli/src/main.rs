//! Atlas SQL command-line client.
//!
//! Builds one pooled driver from flags and environment, runs a single
//! subcommand, prints the result as JSON on stdout and releases the pool
//! before exiting.

use anyhow::{Context, Result};
use atlasdriver_cli::{Cli, Command, build_config, to_pretty_json};
use atlasdriver_core::{AtlasDriver, DownloadOptions, init_logging};
use clap::Parser;
use futures::TryStreamExt;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let config = build_config(&cli.connection).context("Invalid driver configuration")?;
    info!("Target: {}", config);

    let driver = AtlasDriver::new(config)?;
    let outcome = run(&driver, &cli.command).await;
    if let Err(e) = &outcome {
        error!("{}", e);
    }

    // The pool is drained on every exit path.
    if let Err(e) = driver.release().await {
        warn!("Failed to release driver: {}", e);
    }
    debug!(status = ?driver.pool_status(), "Driver released");

    outcome
}

async fn run(driver: &AtlasDriver, command: &Command) -> Result<()> {
    match command {
        Command::Test => {
            driver.test_connection().await?;
            info!("✓ Connection test successful");
            println!(
                "Connection to {} successful",
                driver.config().redacted_url()
            );
        }
        Command::Query {
            sql,
            params,
            types,
            stream,
        } => {
            if *stream {
                let mut rows = driver.stream_query(sql, params).await?;
                let mut count = 0usize;
                while let Some(row) = rows.try_next().await? {
                    println!("{}", serde_json::to_string(&row)?);
                    count += 1;
                }
                info!("✓ Streamed {} rows", count);
            } else if *types {
                let result = driver
                    .download_query_results(sql, params, DownloadOptions::default())
                    .await?;
                info!("✓ {} rows", result.rows.len());
                println!("{}", to_pretty_json(&result)?);
            } else {
                let rows = driver.query(sql, params).await?;
                info!("✓ {} rows", rows.len());
                println!("{}", to_pretty_json(&rows)?);
            }
        }
        Command::Columns { table } => {
            let columns = driver.table_column_types(table).await?;
            println!("{}", to_pretty_json(&columns)?);
        }
        Command::Schema => {
            let schema = driver.tables_schema().await?;
            let table_count: usize = schema.values().map(|tables| tables.len()).sum();
            info!("✓ Found {} tables", table_count);
            println!("{}", to_pretty_json(&schema)?);
        }
        Command::Tables { database } => {
            let tables = driver.tables_query(database).await?;
            println!("{}", to_pretty_json(&tables)?);
        }
    }
    Ok(())
}
