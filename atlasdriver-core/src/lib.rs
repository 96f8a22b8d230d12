//! Pooled SQL connectivity to MongoDB Atlas.
//!
//! This crate lets an analytics engine run SQL against Atlas through the
//! Atlas SQL layer, using either the official wire client or a JDBC bridge
//! sidecar, behind one pooled-connection, introspection and result contract.
//!
//! # Guarantees
//! - At most `max_size` physical connections exist per driver
//! - Every borrowed connection is returned or destroyed exactly once
//! - Connection URLs and passwords never reach logs or error messages
//! - All operations are read-only
//!
//! # Layout
//! - [`driver::AtlasDriver`] is the entry point
//! - [`pool`] owns physical connections built by an [`adapters::ConnectionFactory`]
//! - [`executor`], [`normalizer`] and [`introspection`] run on borrowed connections

pub mod adapters;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod introspection;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod params;
pub mod pool;
pub mod security;

// Re-export commonly used types
pub use adapters::{BackendConnection, ConnectionFactory, ResultCursor, create_factory};
pub use config::{BackendKind, DriverConfig, PoolOptions};
pub use driver::{AtlasDriver, RowStream};
pub use error::{AtlasDriverError, Result};
pub use executor::CancelHandle;
pub use logging::init_logging;
pub use models::{
    ColumnDescriptor, DownloadOptions, DownloadResult, GenericType, Row, SchemaColumn, SchemaMap,
    TableName,
};
pub use pool::{ConnectionPool, PoolStats, PoolStatus};
