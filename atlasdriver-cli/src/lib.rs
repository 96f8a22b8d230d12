//! Argument parsing and output helpers for the `atlasdriver` binary.
//!
//! Kept in a library so the argument surface can be tested without
//! spawning the binary.

use atlasdriver_core::config::{BackendKind, DriverConfig};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "atlasdriver")]
#[command(about = "Run SQL against MongoDB Atlas through the Atlas SQL driver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
atlasdriver - pooled Atlas SQL access from the command line

Connection settings come from flags first, then from the Cube-style
environment (CUBEJS_JDBC_URL, CUBEJS_DB_NAME, CUBEJS_DB_USER, CUBEJS_DB_PASS,
CUBEJS_DB_PORT, CUBEJS_DB_MAX_POOL, CUBEJS_DB_TYPE). Named data sources read
CUBEJS_DS_<NAME>_<SUFFIX> instead.

BACKENDS:
  wire    official MongoDB client issuing $sql aggregations (default)
  bridge  MongoAtlasJDBC.jar run as a sidecar process

EXAMPLES:
  atlasdriver test
  atlasdriver query 'SELECT * FROM orders WHERE status = ?' --param '\"shipped\"'
  atlasdriver columns sales.orders
  atlasdriver --backend bridge schema
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(
        short,
        long,
        global = true,
        help = "Suppress all log output except errors"
    )]
    pub quiet: bool,
}

/// Connection settings; anything left unset falls back to the environment.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Connection URL
    #[arg(
        long,
        env = "CUBEJS_JDBC_URL",
        hide_env_values = true,
        help = "Atlas SQL connection string (credentials are redacted in logs)"
    )]
    pub url: Option<String>,

    /// Default database
    #[arg(long, env = "CUBEJS_DB_NAME")]
    pub database: Option<String>,

    /// Client backend
    #[arg(long, value_name = "wire|bridge")]
    pub backend: Option<BackendKind>,

    /// Named data source
    #[arg(long, default_value = "default")]
    pub data_source: String,

    /// Maximum pooled connections
    #[arg(long, value_name = "N")]
    pub max_pool: Option<usize>,

    /// Location of MongoAtlasJDBC.jar (bridge backend)
    #[arg(long, value_name = "FILE")]
    pub class_path: Option<PathBuf>,

    /// Program used to run the bridge artifact
    #[arg(long, value_name = "PROGRAM")]
    pub bridge_command: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open and close one connection
    Test,
    /// Run a query and print its rows
    Query {
        /// SQL with `?` placeholders
        sql: String,

        /// Positional parameter as JSON (repeatable)
        #[arg(long = "param", value_name = "JSON", value_parser = parse_param)]
        params: Vec<Value>,

        /// Print rows together with column types
        #[arg(long, conflicts_with = "stream")]
        types: bool,

        /// Print rows one JSON object per line as they arrive
        #[arg(long)]
        stream: bool,
    },
    /// Print the column types of `db.table`
    Columns {
        /// Table reference, optionally qualified with its database
        table: String,
    },
    /// Print every table of the configured database with its columns
    Schema,
    /// List the base tables of one database
    Tables {
        /// Database name
        database: String,
    },
}

/// Parses one `--param` value as JSON.
pub fn parse_param(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw)
        .map_err(|e| format!("parameter must be JSON (quote strings, e.g. '\"x\"'): {}", e))
}

/// Resolves the driver configuration from flags, then the environment.
///
/// # Errors
/// Returns a configuration error when no URL is available or a value is
/// invalid
pub fn build_config(args: &ConnectionArgs) -> atlasdriver_core::Result<DriverConfig> {
    let mut builder = DriverConfig::builder().data_source(&args.data_source);
    if let Some(url) = &args.url {
        builder = builder.url(url);
    }
    if let Some(database) = &args.database {
        builder = builder.database(database);
    }
    if let Some(backend) = args.backend {
        builder = builder.backend(backend);
    }
    if let Some(size) = args.max_pool {
        builder = builder.max_pool_size(size);
    }
    if let Some(path) = &args.class_path {
        builder = builder.custom_class_path(path);
    }
    if let Some(program) = &args.bridge_command {
        builder = builder.bridge_command(program);
    }
    builder.build()
}

/// Pretty JSON for one value.
///
/// # Errors
/// Returns an error when the value cannot be serialized
pub fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
